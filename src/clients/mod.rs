pub(crate) mod steam;
