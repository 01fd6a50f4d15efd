//! End-to-end protocol tests

pub mod common;
pub mod logout_tests;
pub mod router_tests;
pub mod signin_tests;
