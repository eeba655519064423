//! Integration tests for sitescribe

mod crawl_tests;
mod fetch_tests;
