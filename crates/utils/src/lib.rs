pub mod assets;
pub mod logging;
pub mod money;
pub mod response;
