pub mod commitment;
pub mod conversation;
pub mod decision;
pub mod operational;
pub mod risk;
