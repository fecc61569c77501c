//! WFS tile fetcher
//!
//! Retrieves raw facility and base-map features for a bounding box from
//! the upstream geographic-feature servers (one for electrical
//! facilities, one for the base map). Requests are WFS 1.1.0
//! `GetFeature` POSTs with a BBOX filter and per-layer property
//! selection; responses are GeoJSON feature collections.
//!
//! One shared HTTP client per process provides keep-alive and bounded
//! concurrency; responses are cached process-wide by quantised bounding
//! box (see [`cache`]).

use std::sync::Arc;
use std::time::Duration;

use grid_geometry::{Bbox, Point};
use grid_topology::{RawFeature, TileSet};
use thiserror::Error;
use tracing::{debug, info};

pub mod cache;

pub use cache::{CacheStats, TileCache, TileKey};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Tile server returned a non-JSON body: {0}")]
    Protocol(String),
    #[error("Failed to decode features: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Which upstream server serves a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    /// Electrical facilities (poles, conductors, transformers).
    Gis,
    /// Base map (roads, buildings, railways, rivers).
    Base,
}

/// The seven layers the pipeline consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Poles,
    LinesHv,
    LinesLv,
    Transformers,
    Roads,
    Buildings,
    Railways,
    Rivers,
}

impl Layer {
    pub fn key(&self) -> &'static str {
        match self {
            Layer::Poles => "pole",
            Layer::LinesHv => "line_hv",
            Layer::LinesLv => "line_lv",
            Layer::Transformers => "transformer",
            Layer::Roads => "road",
            Layer::Buildings => "building",
            Layer::Railways => "railway",
            Layer::Rivers => "river",
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Layer::Poles => "AI_FAC_001.GIS_LOC",
            Layer::LinesHv => "AI_FAC_002.GIS_PTH",
            Layer::LinesLv => "AI_FAC_003.GIS_PTH",
            Layer::Transformers => "AI_FAC_004.GIS_LOC",
            Layer::Roads => "AI_BASE_002.GIS_PTH_VAL",
            Layer::Buildings => "AI_BASE_004.GIS_AREA_VAL",
            Layer::Railways => "AI_BASE_003.GIS_AREA_VAL",
            Layer::Rivers => "AI_BASE_001.GIS_AREA_VAL",
        }
    }

    pub fn geometry_field(&self) -> &'static str {
        match self {
            Layer::Poles | Layer::Transformers => "GIS_LOC",
            Layer::LinesHv | Layer::LinesLv => "GIS_PTH",
            Layer::Roads => "GIS_PTH_VAL",
            Layer::Buildings | Layer::Railways | Layer::Rivers => "GIS_AREA_VAL",
        }
    }

    pub fn server(&self) -> ServerKind {
        match self {
            Layer::Poles | Layer::LinesHv | Layer::LinesLv | Layer::Transformers => {
                ServerKind::Gis
            }
            Layer::Roads | Layer::Buildings | Layer::Railways | Layer::Rivers => ServerKind::Base,
        }
    }

    /// Properties requested per layer; geometry is always included.
    pub fn properties(&self) -> &'static [&'static str] {
        match self {
            Layer::Poles => &[
                "GID",
                "POLE_ID",
                "POLE_FORM_CD",
                "POLE_KND_CD",
                "POLE_SPEC_CD",
                "FAC_STAT_CD",
                "VOLT_VAL",
            ],
            Layer::LinesHv | Layer::LinesLv => &[
                "GID",
                "PRWR_KND_CD",
                "PRWR_SPEC_CD",
                "PHAR_CLCD",
                "VOLT_VAL",
                "FAC_STAT_CD",
                "LWER_FAC_GID",
                "UPPO_FAC_GID",
                "TEXT_GIS_ANNXN",
            ],
            Layer::Transformers => &[
                "GID",
                "TEXT_GIS_ANNXN",
                "PHAR_CLCD",
                "FAC_STAT_CD",
                "CAP_KVA",
                "POLE_ID",
            ],
            Layer::Roads => &["ROAD_ID", "FTR_IDN", "ROAD_TYPE"],
            Layer::Buildings => &["BLDG_ID", "FTR_IDN", "BLDG_TYPE"],
            Layer::Railways | Layer::Rivers => &["FTR_IDN"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub gis_url: String,
    pub base_url: String,
    pub http_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub pool_max_idle_per_host: usize,
    pub max_features: usize,
    pub srs_name: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            gis_url: "http://localhost:8881/wfs/facilities".to_string(),
            base_url: "http://localhost:8881/wfs/basemap".to_string(),
            http_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 100,
            pool_max_idle_per_host: 5,
            max_features: 1000,
            srs_name: "EPSG:3857".to_string(),
        }
    }
}

/// WFS 1.1.0 GetFeature body with a BBOX filter and property selection.
pub fn build_getfeature_xml(
    layer: Layer,
    bbox: Bbox,
    srs_name: &str,
    max_features: usize,
) -> String {
    let props_xml: String = layer
        .properties()
        .iter()
        .chain(std::iter::once(&layer.geometry_field()))
        .map(|p| format!("<wfs:PropertyName>{p}</wfs:PropertyName>"))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:GetFeature
    service="WFS"
    version="1.1.0"
    maxFeatures="{max_features}"
    outputFormat="application/json"
    xmlns:wfs="http://www.opengis.net/wfs"
    xmlns:ogc="http://www.opengis.net/ogc"
    xmlns:gml="http://www.opengis.net/gml">
    <wfs:Query typeName="{type_name}" srsName="{srs_name}">
        {props_xml}
        <ogc:Filter>
            <ogc:BBOX>
                <ogc:PropertyName>{geom_field}</ogc:PropertyName>
                <gml:Envelope srsName="{srs_name}">
                    <gml:lowerCorner>{min_x} {min_y}</gml:lowerCorner>
                    <gml:upperCorner>{max_x} {max_y}</gml:upperCorner>
                </gml:Envelope>
            </ogc:BBOX>
        </ogc:Filter>
    </wfs:Query>
</wfs:GetFeature>"#,
        max_features = max_features,
        type_name = layer.type_name(),
        srs_name = srs_name,
        geom_field = layer.geometry_field(),
        min_x = bbox.min_x,
        min_y = bbox.min_y,
        max_x = bbox.max_x,
        max_y = bbox.max_y,
    )
}

/// Parse a WFS response body: a GeoJSON FeatureCollection or a bare
/// feature array.
pub fn parse_feature_body(body: &str) -> Result<Vec<RawFeature>> {
    let trimmed = body.trim_start();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return Err(FetchError::Protocol(
            trimmed.chars().take(120).collect::<String>(),
        ));
    }
    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    let features = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("features") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    features
        .into_iter()
        .map(|f| serde_json::from_value(f).map_err(FetchError::from))
        .collect()
}

/// The tile fetcher. Cheap to clone; the HTTP client and cache are
/// shared.
#[derive(Clone)]
pub struct WfsClient {
    config: Arc<FetcherConfig>,
    client: reqwest::Client,
    cache: Arc<TileCache>,
}

impl WfsClient {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        let cache = Arc::new(TileCache::new(config.cache_ttl, config.cache_capacity));
        info!(
            "WFS client ready: gis={}, base={}, pool={}/host",
            config.gis_url, config.base_url, config.pool_max_idle_per_host
        );
        Ok(Self {
            config: Arc::new(config),
            client,
            cache,
        })
    }

    /// Same servers and pool, different cache (used by tests).
    pub fn with_cache(mut self, cache: Arc<TileCache>) -> Self {
        self.cache = cache;
        self
    }

    fn server_url(&self, layer: Layer) -> &str {
        match layer.server() {
            ServerKind::Gis => &self.config.gis_url,
            ServerKind::Base => &self.config.base_url,
        }
    }

    /// Fetch one layer slice for a bounding box, via the cache.
    pub async fn fetch(&self, bbox: Bbox, layer: Layer) -> Result<Arc<Vec<RawFeature>>> {
        let url = self.server_url(layer).to_string();
        let key = TileKey::new(&url, layer.key(), bbox);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let body = build_getfeature_xml(layer, bbox, &self.config.srs_name, self.config.max_features);
        debug!("Fetching {} for bbox {:?}", layer.key(), bbox);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "text/xml")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;
        let features = Arc::new(parse_feature_body(&text)?);
        self.cache.insert(key, features.clone());
        Ok(features)
    }

    /// Fetch every consumed layer for a square box centred on the
    /// consumer. Per-layer fetches run concurrently and all must
    /// succeed.
    pub async fn fetch_all(&self, center: Point, size_m: f64) -> Result<TileSet> {
        self.fetch_all_bbox(Bbox::from_center(center, size_m)).await
    }

    /// Fetch every consumed layer for an explicit bounding box.
    pub async fn fetch_all_bbox(&self, bbox: Bbox) -> Result<TileSet> {
        let (poles, lines_hv, lines_lv, transformers, roads, buildings, railways, rivers) =
            futures::try_join!(
                self.fetch(bbox, Layer::Poles),
                self.fetch(bbox, Layer::LinesHv),
                self.fetch(bbox, Layer::LinesLv),
                self.fetch(bbox, Layer::Transformers),
                self.fetch(bbox, Layer::Roads),
                self.fetch(bbox, Layer::Buildings),
                self.fetch(bbox, Layer::Railways),
                self.fetch(bbox, Layer::Rivers),
            )?;

        Ok(TileSet {
            poles: poles.as_ref().clone(),
            lines_hv: lines_hv.as_ref().clone(),
            lines_lv: lines_lv.as_ref().clone(),
            transformers: transformers.as_ref().clone(),
            roads: roads.as_ref().clone(),
            buildings: buildings.as_ref().clone(),
            railways: railways.as_ref().clone(),
            rivers: rivers.as_ref().clone(),
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_getfeature_xml_carries_bbox_and_layer() {
        let xml = build_getfeature_xml(
            Layer::Poles,
            Bbox::new(100.0, 200.0, 500.0, 600.0),
            "EPSG:3857",
            1000,
        );
        assert!(xml.contains("AI_FAC_001.GIS_LOC"));
        assert!(xml.contains("<gml:lowerCorner>100 200</gml:lowerCorner>"));
        assert!(xml.contains("<gml:upperCorner>500 600</gml:upperCorner>"));
        assert!(xml.contains("<wfs:PropertyName>GIS_LOC</wfs:PropertyName>"));
        assert!(xml.contains(r#"maxFeatures="1000""#));
    }

    #[test]
    fn test_layer_routing() {
        assert_eq!(Layer::Poles.server(), ServerKind::Gis);
        assert_eq!(Layer::Roads.server(), ServerKind::Base);
        assert_eq!(Layer::Buildings.geometry_field(), "GIS_AREA_VAL");
    }

    #[test]
    fn test_parse_feature_collection() {
        let body = r#"{"type":"FeatureCollection","features":[
            {"geometry":{"type":"Point","coordinates":[1.0,2.0]},"properties":{"GID":"P1"}},
            {"geometry":{"type":"Point","coordinates":[3.0,4.0]},"properties":{"GID":"P2"}}
        ]}"#;
        let features = parse_feature_body(body).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[1].prop_str(&["GID"]), Some("P2".to_string()));
    }

    #[test]
    fn test_parse_bare_array() {
        let body = r#"[{"geometry":{"type":"Point","coordinates":[1.0,2.0]},"properties":{}}]"#;
        assert_eq!(parse_feature_body(body).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_rejects_html() {
        let err = parse_feature_body("<html>server error</html>").unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }
}
