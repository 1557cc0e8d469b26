pub(crate) mod image;
pub(crate) mod project;
pub(crate) mod user;
