pub(crate) mod sort_session;
