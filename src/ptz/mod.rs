pub mod backends;
pub mod command;
pub mod controller;
pub mod stream;

pub use command::{PtzAction, PtzBackendKind, PtzCommand, PtzDirection};
pub use controller::PtzController;
pub use stream::{StreamQuality, StreamSelection, StreamSelector};
