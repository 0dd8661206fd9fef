mod error;
mod seqlock;

pub use error::{EmptyError, ReadError};
pub use seqlock::Seqlock;
