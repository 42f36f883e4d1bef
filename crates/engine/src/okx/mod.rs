pub mod rest;

pub use rest::OkxClient;
