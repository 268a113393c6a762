mod common;
mod emit;
