mod data;

pub use data::{ScriptedResponse, TestDataClient};
