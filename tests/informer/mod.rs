mod concurrency_test;
mod lifecycle_test;
mod shutdown_test;
