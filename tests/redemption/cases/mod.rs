//! Redemption end-to-end test cases

mod rpc;
mod submission;
