//! Behavioural scenarios for `knife-euca server create`.

mod server_create;
