#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use kubi_core as core;
pub use kubi_k8s_api as k8s;

mod args;
pub mod fetch;

pub use self::{
    args::Args,
    fetch::{FetchError, Fetcher},
};
