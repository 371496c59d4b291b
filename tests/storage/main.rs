// Storage integration tests

mod store_test;
