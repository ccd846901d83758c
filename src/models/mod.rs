// src/models/mod.rs

pub mod attempt;
pub mod question;
pub mod user;

pub type UserId = i64;
pub type TestId = i64;
pub type QuestionId = i64;
pub type AttemptId = i64;
