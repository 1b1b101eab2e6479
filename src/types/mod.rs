pub mod bibliography;
pub mod paper;
pub mod reference;
pub mod research;
