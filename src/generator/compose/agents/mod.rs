pub mod background;
pub mod discovery;
pub mod front_matter;
