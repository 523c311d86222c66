pub mod anthropic;
pub mod assembler;
pub mod canonical;
pub mod mapping;
pub mod normalize;
