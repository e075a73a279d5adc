mod common;
mod html_pipeline_tests;
