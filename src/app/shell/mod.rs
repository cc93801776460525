pub mod batch;
pub mod dispatch;
pub mod pool;
pub mod runner;
pub mod validator;
