use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::biometrics::{backend_from_config, Biometrics};
use crate::gate::BallotGate;
use crate::model::mongodb::ensure_indexes_exist;
use crate::store::MongoStore;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_auth_ttl")]
    auth_ttl: u32,
    #[serde(default)]
    face: FaceConfig,
    // secrets
    jwt_secret: String,
}

fn default_auth_ttl() -> u32 {
    3600
}

impl Config {
    /// Valid lifetime of auth tokens in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign and verify JWTs. Shared with the login service.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Face pipeline tuning.
    pub fn face(&self) -> &FaceConfig {
        &self.face
    }
}

/// Tuning for the face pipeline. Every field has a default, so the whole
/// `face` table may be omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    /// Maximum embedding distance still accepted as the same person.
    pub match_threshold: f64,
    /// Frames are shrunk until their largest side is at most this.
    pub max_image_dim: u32,
    /// Frames are enlarged towards this on their smallest side, never past
    /// `max_image_dim` on the largest.
    pub min_image_dim: u32,
    /// Detector upsampling passes; higher finds smaller faces, slower.
    pub detection_upsample: u32,
    /// Encoder jitter passes; fixed so repeated frames embed reproducibly.
    pub encoding_jitters: u32,
    /// dlib landmark predictor model, e.g. `shape_predictor_5_face_landmarks.dat`.
    pub landmark_model: Option<PathBuf>,
    /// dlib face encoder model, e.g. `dlib_face_recognition_resnet_model_v1.dat`.
    pub encoder_model: Option<PathBuf>,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            max_image_dim: 800,
            min_image_dim: 250,
            detection_upsample: 2,
            encoding_jitters: 2,
            landmark_model: None,
            encoder_model: None,
        }
    }
}

impl FaceConfig {
    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), String> {
        let threshold = self.match_threshold;
        if threshold.is_nan() || threshold <= 0.0 {
            return Err(format!("match threshold must be positive, got {threshold}"));
        }
        if self.max_image_dim == 0 {
            return Err("max image dimension must be positive".to_string());
        }
        if self.min_image_dim > self.max_image_dim {
            return Err(format!(
                "min image dimension {} exceeds max image dimension {}",
                self.min_image_dim, self.max_image_dim
            ));
        }
        Ok(())
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if let Err(problem) = config.face.validate() {
            error!("Invalid face config: {problem}");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "facevote".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// ensures the uniqueness indexes exist, and places both a `Client` and a
/// `Database` into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        // The one-ballot-per-voter invariant lives in these indexes.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// A fairing that wires the face backend and the MongoDB-backed stores into
/// a [`BallotGate`] and places it in managed state.
///
/// Must be attached after [`ConfigFairing`] and [`DatabaseFairing`].
pub struct GateFairing;

#[rocket::async_trait]
impl Fairing for GateFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ballot gate",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (face_config, db) = match (rocket.state::<Config>(), rocket.state::<Database>()) {
            (Some(config), Some(db)) => (config.face().clone(), db.clone()),
            _ => {
                error!("Ballot gate needs the config and database fairings to run first");
                return Err(rocket);
            }
        };

        let store = Arc::new(MongoStore::from_db(&db));
        let backend = backend_from_config(&face_config);
        let biometrics = Biometrics::new(backend, store.clone(), &face_config);
        let gate = BallotGate::new(store.clone(), store.clone(), store, biometrics);
        info!(
            "Ballot gate ready (match threshold {})",
            face_config.match_threshold
        );

        Ok(rocket.manage(gate))
    }
}
