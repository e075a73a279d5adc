mod cache_tests;
mod common;
mod orchestrator_tests;
