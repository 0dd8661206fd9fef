use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum EmptyError {
    #[error("cell empty")]
    Empty,
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadError {
    #[error("got sped past by a writer")]
    SpedPast,
    #[error("cell empty")]
    Empty,
}
