pub(crate) mod emit;
