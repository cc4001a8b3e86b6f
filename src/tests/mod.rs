mod client_tests;
mod validation_tests;
