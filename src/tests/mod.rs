pub(crate) mod retry_401_failure;
pub(crate) mod test_support;
