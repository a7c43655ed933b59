use std::env;
use std::path::PathBuf;
use crate::identity::ClusterParams;

#[derive(Clone, Debug)]
pub struct Config {
    pub data: PathBuf,
    pub port: u16,
    pub db_pool_size: u32,
    pub face_eps: f32,
    pub face_min_samples: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let data = env::var("GALLERY_DATA").unwrap_or_else(|_| ".gallery".to_string());
        let port = env::var("GALLERY_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(9162);
        let db_pool_size = env::var("GALLERY_DB_POOL").ok().and_then(|v| v.parse().ok()).unwrap_or(8);
        // Empirically 0.38-0.44 separates people well for 128-d face encodings.
        let face_eps = env::var("GALLERY_FACE_EPS")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(0.44);
        let face_min_samples = env::var("GALLERY_FACE_MIN_SAMPLES")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(3);
        Self {
            data: PathBuf::from(data),
            port,
            db_pool_size,
            face_eps,
            face_min_samples,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data.join("gallery.db")
    }

    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams { eps: self.face_eps, min_samples: self.face_min_samples }
    }
}
