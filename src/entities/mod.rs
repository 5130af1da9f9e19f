pub mod prelude;

pub mod assets;
