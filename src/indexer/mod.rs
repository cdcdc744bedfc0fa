pub mod decoder;
pub mod source;
pub mod stream;
pub mod types;
pub mod window;
