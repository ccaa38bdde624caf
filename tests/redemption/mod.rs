//! Redemption end-to-end tests against mocked bundler and chain endpoints.

mod cases;
mod environment;
