pub mod dedup;
pub mod fanout;
pub mod formatter;
pub mod limiter;
pub mod monitoring;
pub mod pipeline;
pub mod scheduler;
pub mod subscriptions;
pub mod telegram;

#[cfg(test)]
pub mod testing;
