#![cfg(feature = "serde")]

mod common;

use sky_area::prelude::*;
use sky_area::KMeansFit;
use sky_area::cluster::kmeans;

#[test]
fn config_round_trip() {
    let config = PosteriorConfig {
        n_trials: 3,
        accuracy: 5e-3,
        max_nside: 256,
        max_grid_order: 20,
        max_kmeans_iterations: Some(500),
        seed: Some(99),
    };
    let json = serde_json::to_string(&config).unwrap();
    let loaded: PosteriorConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn sky_map_round_trip() {
    let mut rng = fastrand::Rng::with_seed(1);
    let points = common::sky_blob(&mut rng, 200, 1.0, 0.2, 0.05);
    let posterior = SkyPosterior::builder()
        .n_trials(1)
        .seed(1)
        .build_sky(&points)
        .unwrap();
    let map = posterior
        .to_healpix(4, PixelOrdering::Ring, MapMethod::Direct)
        .unwrap();

    let json = serde_json::to_string(&map).unwrap();
    let loaded: SkyMap = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded.nside(), 4);
    assert_eq!(loaded.ordering(), PixelOrdering::Ring);
    assert_eq!(loaded.values().len(), map.values().len());
    for (a, b) in loaded.values().iter().zip(map.values()) {
        assert!((a - b).abs() <= 1e-15 * b.abs().max(1e-300));
    }
}

#[test]
fn points_and_records_round_trip() {
    let point = VolumePoint::new(0.5, -0.25, 42.0);
    let json = serde_json::to_string(&point).unwrap();
    assert_eq!(serde_json::from_str::<VolumePoint>(&json).unwrap(), point);

    let record = AreaRecord {
        simulation_id: "sim_7".to_owned(),
        p_value: 0.125,
        searched_area: 17.5,
        credible_areas: vec![10.0, 20.0, 30.0],
    };
    let json = serde_json::to_string(&record).unwrap();
    assert_eq!(serde_json::from_str::<AreaRecord>(&json).unwrap(), record);
}

#[test]
fn kmeans_fit_round_trip() {
    let mut rng = fastrand::Rng::with_seed(2);
    let points: Vec<Vec<f64>> = (0..40)
        .map(|i| vec![f64::from(i % 2) * 10.0 + rng.f64(), rng.f64()])
        .collect();
    let fit = kmeans(&points, 2, &mut rng, None).unwrap();
    let json = serde_json::to_string(&fit).unwrap();
    let loaded: KMeansFit = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded.assignment, fit.assignment);
}

#[test]
fn enums_serialize_by_name() {
    assert_eq!(serde_json::to_string(&AreaMethod::Refined).unwrap(), "\"Refined\"");
    assert_eq!(serde_json::to_string(&MapMethod::Direct).unwrap(), "\"Direct\"");
    assert_eq!(serde_json::to_string(&PixelOrdering::Nested).unwrap(), "\"Nested\"");
}
