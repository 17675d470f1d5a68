//! BDD suite for the server create flow.

mod bdd_steps;
mod scenarios;
mod test_helpers;
