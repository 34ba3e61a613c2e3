//! Map view state: base layer, viewport and the user position marker.

use std::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::geometry::Point;
use crate::location::{
    GpsReadout, LocationError, PositionProvider, PulseFrame, UserMarker, PULSE_INTERVAL,
};

/// Latitude/longitude the map opens on.
pub const DEFAULT_CENTER: Point = Point {
    x: -75.0152,
    y: -9.19,
};
pub const DEFAULT_ZOOM: u8 = 5;
/// Zoom used after locating the user.
pub const LOCATE_ZOOM: u8 = 19;
const ATTRIBUTION: &str = "DEVIDA";

/// Selectable tile source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BaseLayer {
    #[default]
    Satellite,
    Light,
}

impl BaseLayer {
    pub const ALL: [BaseLayer; 2] = [BaseLayer::Satellite, BaseLayer::Light];

    pub fn name(&self) -> &'static str {
        match self {
            BaseLayer::Satellite => "Satellite",
            BaseLayer::Light => "Light",
        }
    }

    pub fn url_template(&self) -> &'static str {
        match self {
            BaseLayer::Satellite => "https://mt1.google.com/vt/lyrs=s&x={x}&y={y}&z={z}",
            BaseLayer::Light => "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
        }
    }

    /// URL of one tile.
    pub fn tile_url(&self, z: u8, x: u32, y: u32) -> String {
        self.url_template()
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }

    pub fn max_zoom(&self) -> u8 {
        match self {
            BaseLayer::Satellite => 20,
            BaseLayer::Light => 19,
        }
    }

    pub fn attribution(&self) -> &'static str {
        ATTRIBUTION
    }
}

/// Map page state.
pub struct MapView {
    center: Point,
    zoom: u8,
    base_layer: BaseLayer,
    marker: Option<UserMarker>,
    gps: Option<GpsReadout>,
    loading: bool,
    pulse_interval: Duration,
    high_accuracy: bool,
}

impl Default for MapView {
    fn default() -> Self {
        Self::new()
    }
}

impl MapView {
    pub fn new() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            base_layer: BaseLayer::default(),
            marker: None,
            gps: None,
            loading: false,
            pulse_interval: PULSE_INTERVAL,
            high_accuracy: true,
        }
    }

    /// Map view using the GPS settings of `config`.
    pub fn with_config(config: &AppConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            ..Self::new()
        }
    }

    /// Overrides the marker animation interval.
    pub fn with_pulse_interval(mut self, interval: Duration) -> Self {
        self.pulse_interval = interval;
        self
    }

    /// Whether positions are requested with high accuracy.
    pub fn high_accuracy(&self) -> bool {
        self.high_accuracy
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn base_layer(&self) -> BaseLayer {
        self.base_layer
    }

    /// Switches the tile source, clamping the zoom to what it supports.
    pub fn set_base_layer(&mut self, layer: BaseLayer) {
        self.base_layer = layer;
        self.zoom = self.zoom.min(layer.max_zoom());
    }

    pub fn set_view(&mut self, center: Point, zoom: u8) {
        self.center = center;
        self.zoom = zoom.min(self.base_layer.max_zoom());
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn gps_readout(&self) -> Option<&GpsReadout> {
        self.gps.as_ref()
    }

    pub fn marker(&self) -> Option<&UserMarker> {
        self.marker.as_ref()
    }

    pub fn pulse_frame(&self) -> Option<PulseFrame> {
        self.marker.as_ref().map(|m| m.pulse_frame())
    }

    /// Asks the device for its position and centres the map on it.
    ///
    /// The loading flag is cleared whatever the outcome. Failures are logged
    /// and returned; nothing is retried.
    pub fn locate_user<P: PositionProvider + ?Sized>(
        &mut self,
        provider: &mut P,
    ) -> Result<GpsReadout, LocationError> {
        self.loading = true;
        let result = provider.current_position(self.high_accuracy);
        self.loading = false;
        let position = result.map_err(|e| {
            error!("error getting location: {}", e);
            e
        })?;
        let readout = GpsReadout::from_position(&position);
        let here = position.point();
        match &mut self.marker {
            Some(marker) => marker.move_to(here),
            None => self.marker = Some(UserMarker::with_interval(here, self.pulse_interval)),
        }
        self.gps = Some(readout);
        self.set_view(here, LOCATE_ZOOM);
        info!("located at {}, {}", readout.lat, readout.lng);
        Ok(readout)
    }

    /// Removes the position marker and stops its animation.
    pub fn clear_location(&mut self) {
        self.marker = None;
    }
}
