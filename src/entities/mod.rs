mod bid;
mod event;
pub mod otp;
mod presence;
mod route;
mod safety;
mod score;
mod trip;
mod zone;

pub use bid::*;
pub use event::*;
pub use otp::*;
pub use presence::*;
pub use route::*;
pub use safety::*;
pub use score::*;
pub use trip::*;
pub use zone::*;
