#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{DatabaseFairing, GateFairing};
use crate::logging::LoggerFairing;

pub use crate::config::{Config, ConfigFairing, FaceConfig};

pub mod api;
pub mod biometrics;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod model;
pub mod store;

#[cfg(test)]
mod testing;

/// Build the production server. Config, database and the ballot gate are
/// set up by fairings when the server ignites.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(GateFairing)
}

/// Build a server around an already-constructed ballot gate backed by
/// in-memory stores.
#[cfg(test)]
fn rocket_for_gate(
    rocket: Rocket<Build>,
    config: Config,
    gate: gate::BallotGate,
) -> Rocket<Build> {
    rocket
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .manage(config)
        .manage(gate)
}
