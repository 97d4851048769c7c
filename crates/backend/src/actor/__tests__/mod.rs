mod continuation;
mod handlers;
mod helpers;
mod transport;
mod worker;
