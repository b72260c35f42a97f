pub mod answers;
pub mod engine;
pub mod questions;
pub mod scoring;
pub mod selector;
pub mod timer;

pub use answers::*;
pub use engine::*;
pub use questions::*;
pub use scoring::*;
pub use selector::*;
pub use timer::*;
