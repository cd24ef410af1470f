//! 基本型

mod color;
mod game_result;
mod opening;

pub use color::Color;
pub use game_result::GameResult;
pub use opening::Opening;
