mod cancellation;
mod fanout;
mod osint;
mod patterns;
