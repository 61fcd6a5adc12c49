pub mod audit;
pub mod cascade;
pub mod lifecycle;
pub mod risk;
pub mod transition;
