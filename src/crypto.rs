pub(crate) mod hasher;
