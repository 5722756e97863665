//! Two-level feature routing: media type, then feature slug.

use std::collections::HashMap;

use pivot_models::{
    Feature, FeatureParams, JobEnvelope, MediaType, ValidationError, ValidationResult,
};

/// A feature resolved from an envelope, with its decoded parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedJob {
    pub feature: Feature,
    pub params: FeatureParams,
}

/// Routing table built from the feature catalogue.
#[derive(Debug, Clone)]
pub struct FeatureRouter {
    routes: HashMap<MediaType, HashMap<&'static str, Feature>>,
}

impl Default for FeatureRouter {
    fn default() -> Self {
        Self::with_features(&Feature::ALL)
    }
}

impl FeatureRouter {
    /// Router over a subset of the catalogue. Every media type gets a table,
    /// possibly empty.
    pub fn with_features(features: &[Feature]) -> Self {
        let mut routes: HashMap<MediaType, HashMap<&'static str, Feature>> = MediaType::ALL
            .into_iter()
            .map(|media| (media, HashMap::new()))
            .collect();

        for feature in features {
            routes
                .entry(feature.media_type())
                .or_default()
                .insert(feature.slug(), *feature);
        }

        Self { routes }
    }

    /// Registered features of one media type, sorted by slug.
    pub fn features(&self, media: MediaType) -> Vec<Feature> {
        let mut features: Vec<Feature> = self
            .routes
            .get(&media)
            .map(|table| table.values().copied().collect())
            .unwrap_or_default();
        features.sort_by_key(|f| f.slug());
        features
    }

    /// Resolve the feature and decode its parameters. Performs no I/O.
    pub fn resolve(&self, envelope: &JobEnvelope) -> ValidationResult<RoutedJob> {
        let media: MediaType = envelope.media_type.parse()?;
        let slug = envelope.feature_slug.trim();

        let feature = self
            .routes
            .get(&media)
            .and_then(|table| table.get(slug))
            .copied()
            .ok_or_else(|| ValidationError::unknown_feature(media.label(), slug))?;

        let params = FeatureParams::decode(feature, &envelope.params)?;
        Ok(RoutedJob { feature, params })
    }
}
