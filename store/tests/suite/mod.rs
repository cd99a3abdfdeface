mod answers;
mod concurrency;
mod documents;
mod lifecycle;
