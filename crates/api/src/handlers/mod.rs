pub mod dag;
pub mod fsm;
pub mod query;
pub mod reaper;
