pub mod config;
pub mod editor;
pub mod error;
pub mod io;
pub mod plot;
pub mod session;
pub mod signal;
pub mod store;
pub mod video;

pub use config::*;
pub use error::*;
pub use session::*;
pub use signal::*;
pub use store::*;
