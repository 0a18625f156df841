// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Drive-time selection through an external routing provider.
//!
//! Routing is slow and remote, so every request runs under a ticket issued by
//! a [`DriveTimeGate`]. Starting a new request for the same gesture cancels
//! the previous one, and a result that arrives for a superseded ticket is
//! discarded instead of being applied out of order.
//!
//! The gate is `Sync`: tickets can be resolved on worker threads while the
//! owning session keeps issuing new ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use kurbo::Point;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::GeometryError;
use crate::geometry::is_geographic;
use crate::spatial::SpatialIndex;
use crate::types::{Granularity, RegionCode};

/// Drive-time selection request.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DriveTimeRequest {
    /// Start of the drive (`x = lng`, `y = lat`).
    pub origin: Point,
    /// Maximum travel time.
    pub max_duration_minutes: f64,
    /// Granularity the provider should resolve codes at.
    pub granularity: Granularity,
}

/// What a routing provider returns.
#[derive(Clone, Debug, PartialEq)]
pub enum RoutingResult {
    /// Region codes reachable within the duration, possibly unnormalized.
    Codes(Vec<String>),
    /// Reachability polygon; codes whose centroid lies inside are selected.
    Isochrone(Vec<Point>),
}

/// Failure reported by a routing provider.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RoutingError {
    /// The provider could not be reached or answered with an error.
    #[error("routing provider failed: {0}")]
    Provider(String),
    /// The provider noticed the cancellation token and stopped early.
    #[error("routing request was cancelled")]
    Cancelled,
}

/// Failure of a drive-time selection.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DriveTimeError {
    /// Origin was not a valid longitude/latitude pair.
    #[error("invalid drive-time origin")]
    InvalidOrigin(#[source] GeometryError),
    /// Duration was not a positive finite number of minutes.
    #[error("drive-time duration {0} must be positive and finite")]
    InvalidDuration(f64),
    /// Request granularity differs from the indexed dataset.
    #[error("request is for {requested} codes but the dataset is {dataset}")]
    GranularityMismatch {
        /// Granularity of the request.
        requested: Granularity,
        /// Granularity of the index.
        dataset: Granularity,
    },
    /// A newer request for the same gesture replaced this one.
    #[error("drive-time request was superseded")]
    Superseded,
    /// The routing provider failed.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// The returned isochrone was not a usable ring.
    #[error("routing provider returned an invalid isochrone")]
    Isochrone(#[source] GeometryError),
}

/// Shared cancellation flag handed to the routing provider.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// External routing collaborator.
pub trait RoutingProvider {
    /// Resolve a request. Long-running providers should poll `cancel`.
    fn resolve(
        &self,
        request: &DriveTimeRequest,
        cancel: &CancelToken,
    ) -> Result<RoutingResult, RoutingError>;
}

/// Identifies the gesture (map widget, tool slot) a request belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GestureId(pub u64);

/// Proof that a request was started through the gate.
#[derive(Clone, Debug)]
pub struct DriveTimeTicket {
    gesture: GestureId,
    seq: u64,
    request: DriveTimeRequest,
    cancel: CancelToken,
}

impl DriveTimeTicket {
    /// The validated request.
    pub fn request(&self) -> &DriveTimeRequest {
        &self.request
    }

    /// Token to pass to the provider.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

#[derive(Debug, Default)]
struct GateState {
    next_seq: u64,
    in_flight: HashMap<GestureId, (u64, CancelToken)>,
}

/// Issues tickets and discards stale routing results.
#[derive(Debug, Default)]
pub struct DriveTimeGate {
    state: Mutex<GateState>,
}

impl DriveTimeGate {
    /// Empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `request` and start it for `gesture`, cancelling any request
    /// the gesture still has in flight.
    pub fn begin(
        &self,
        index: &SpatialIndex,
        gesture: GestureId,
        request: DriveTimeRequest,
    ) -> Result<DriveTimeTicket, DriveTimeError> {
        validate(index, &request)?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next_seq += 1;
        let seq = state.next_seq;
        let cancel = CancelToken::new();
        if let Some((old, token)) = state.in_flight.insert(gesture, (seq, cancel.clone())) {
            debug!(gesture = gesture.0, superseded = old, "cancelling previous drive-time request");
            token.cancel();
        }
        Ok(DriveTimeTicket {
            gesture,
            seq,
            request,
            cancel,
        })
    }

    /// Cancel whatever `gesture` has in flight.
    pub fn cancel(&self, gesture: GestureId) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, token)) = state.in_flight.remove(&gesture) {
            token.cancel();
        }
    }

    /// Whether `gesture` has a request in flight.
    pub fn is_pending(&self, gesture: GestureId) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight.contains_key(&gesture)
    }

    /// Turn a provider result into codes, unless the ticket went stale.
    ///
    /// Code lists are normalized and filtered to codes the index knows;
    /// isochrones go through [`SpatialIndex::polygon_query`].
    pub fn finish(
        &self,
        index: &SpatialIndex,
        ticket: DriveTimeTicket,
        result: Result<RoutingResult, RoutingError>,
    ) -> Result<Vec<RegionCode>, DriveTimeError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let current = state.in_flight.get(&ticket.gesture).map(|(seq, _)| *seq);
            if current != Some(ticket.seq) || ticket.cancel.is_cancelled() {
                debug!(gesture = ticket.gesture.0, seq = ticket.seq, "discarding stale drive-time result");
                return Err(DriveTimeError::Superseded);
            }
            state.in_flight.remove(&ticket.gesture);
        }
        let result = result.inspect_err(|e| warn!(error = %e, "routing provider failed"))?;
        match result {
            RoutingResult::Codes(raw) => {
                let granularity = ticket.request.granularity;
                let mut codes: Vec<RegionCode> = raw
                    .iter()
                    .filter_map(|c| granularity.normalize(c))
                    .filter(|c| {
                        let known = index.feature(c.as_str()).is_some();
                        if !known {
                            debug!(code = %c, "dropping unknown routed code");
                        }
                        known
                    })
                    .collect();
                codes.sort_unstable();
                codes.dedup();
                Ok(codes)
            }
            RoutingResult::Isochrone(ring) => {
                index.polygon_query(&ring).map_err(DriveTimeError::Isochrone)
            }
        }
    }
}

fn validate(index: &SpatialIndex, request: &DriveTimeRequest) -> Result<(), DriveTimeError> {
    let origin = request.origin;
    if !origin.is_finite() {
        return Err(DriveTimeError::InvalidOrigin(GeometryError::NonFinite { index: 0 }));
    }
    if !is_geographic(origin) {
        return Err(DriveTimeError::InvalidOrigin(GeometryError::OutOfRange {
            index: 0,
            x: origin.x,
            y: origin.y,
        }));
    }
    let minutes = request.max_duration_minutes;
    if !minutes.is_finite() || minutes <= 0.0 {
        return Err(DriveTimeError::InvalidDuration(minutes));
    }
    let dataset = index.dataset().granularity();
    if request.granularity != dataset {
        return Err(DriveTimeError::GranularityMismatch {
            requested: request.granularity,
            dataset,
        });
    }
    Ok(())
}

/// Run a drive-time selection end to end on the calling thread.
pub fn drive_time_select(
    gate: &DriveTimeGate,
    index: &SpatialIndex,
    gesture: GestureId,
    request: DriveTimeRequest,
    provider: &dyn RoutingProvider,
) -> Result<Vec<RegionCode>, DriveTimeError> {
    let ticket = gate.begin(index, gesture, request)?;
    let result = provider.resolve(ticket.request(), ticket.cancel_token());
    gate.finish(index, ticket, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpatialConfig;
    use crate::dataset::{BoundaryDataset, RawFeature, RawGeometry};
    use serde_json::{Map, Value};

    fn index() -> SpatialIndex {
        let raw: Vec<RawFeature> = (0..5)
            .map(|i| {
                let x = 11.0 + f64::from(i) * 0.1;
                RawFeature {
                    id: Some(Value::from(format!("8033{i}"))),
                    properties: Map::new(),
                    geometry: RawGeometry::Polygon(vec![vec![
                        vec![x, 48.0],
                        vec![x + 0.1, 48.0],
                        vec![x + 0.1, 48.1],
                        vec![x, 48.1],
                    ]]),
                }
            })
            .collect();
        let config = SpatialConfig::default();
        let ds = BoundaryDataset::from_raw(Granularity::FIVE, raw, &config.code_keys).unwrap();
        SpatialIndex::new(Arc::new(ds), &config)
    }

    fn request() -> DriveTimeRequest {
        DriveTimeRequest {
            origin: Point::new(11.15, 48.05),
            max_duration_minutes: 15.0,
            granularity: Granularity::FIVE,
        }
    }

    struct Fixed(RoutingResult);

    impl RoutingProvider for Fixed {
        fn resolve(
            &self,
            _: &DriveTimeRequest,
            cancel: &CancelToken,
        ) -> Result<RoutingResult, RoutingError> {
            if cancel.is_cancelled() {
                return Err(RoutingError::Cancelled);
            }
            Ok(self.0.clone())
        }
    }

    #[test]
    fn code_lists_are_filtered_and_deduplicated() {
        let ix = index();
        let gate = DriveTimeGate::new();
        let provider = Fixed(RoutingResult::Codes(
            ["80332", "80331", "80331", "99999", "x"].map(String::from).to_vec(),
        ));
        let codes = drive_time_select(&gate, &ix, GestureId(1), request(), &provider).unwrap();
        assert_eq!(codes, ["80331", "80332"].map(RegionCode::from).to_vec());
        assert!(!gate.is_pending(GestureId(1)));
    }

    #[test]
    fn isochrones_select_by_centroid() {
        let ix = index();
        let gate = DriveTimeGate::new();
        let provider = Fixed(RoutingResult::Isochrone(vec![
            Point::new(11.0, 47.9),
            Point::new(11.22, 47.9),
            Point::new(11.22, 48.2),
            Point::new(11.0, 48.2),
        ]));
        let codes = drive_time_select(&gate, &ix, GestureId(1), request(), &provider).unwrap();
        assert_eq!(codes, ["80330", "80331"].map(RegionCode::from).to_vec());

        let broken = Fixed(RoutingResult::Isochrone(vec![Point::new(11.0, 48.0)]));
        assert!(matches!(
            drive_time_select(&gate, &ix, GestureId(1), request(), &broken),
            Err(DriveTimeError::Isochrone(_))
        ));
    }

    #[test]
    fn newer_request_supersedes_older() {
        let ix = index();
        let gate = DriveTimeGate::new();
        let first = gate.begin(&ix, GestureId(7), request()).unwrap();
        let second = gate.begin(&ix, GestureId(7), request()).unwrap();
        assert!(first.cancel_token().is_cancelled());
        assert!(!second.cancel_token().is_cancelled());

        let stale = gate.finish(&ix, first, Ok(RoutingResult::Codes(vec!["80330".into()])));
        assert_eq!(stale, Err(DriveTimeError::Superseded));
        let fresh = gate.finish(&ix, second, Ok(RoutingResult::Codes(vec!["80334".into()])));
        assert_eq!(fresh, Ok(vec![RegionCode::from("80334")]));
    }

    #[test]
    fn other_gestures_are_independent() {
        let ix = index();
        let gate = DriveTimeGate::new();
        let a = gate.begin(&ix, GestureId(1), request()).unwrap();
        let b = gate.begin(&ix, GestureId(2), request()).unwrap();
        assert!(!a.cancel_token().is_cancelled());
        gate.cancel(GestureId(2));
        assert!(b.cancel_token().is_cancelled());
        assert_eq!(
            gate.finish(&ix, b, Ok(RoutingResult::Codes(vec![]))),
            Err(DriveTimeError::Superseded)
        );
        assert!(gate.finish(&ix, a, Ok(RoutingResult::Codes(vec![]))).is_ok());
    }

    #[test]
    fn invalid_requests_are_rejected_up_front() {
        let ix = index();
        let gate = DriveTimeGate::new();
        let mut r = request();
        r.max_duration_minutes = 0.0;
        assert_eq!(
            gate.begin(&ix, GestureId(1), r).map(|_| ()),
            Err(DriveTimeError::InvalidDuration(0.0))
        );
        let mut r = request();
        r.granularity = Granularity::TWO;
        assert!(matches!(
            gate.begin(&ix, GestureId(1), r),
            Err(DriveTimeError::GranularityMismatch { .. })
        ));
        let mut r = request();
        r.origin = Point::new(500.0, 10.0);
        assert!(matches!(
            gate.begin(&ix, GestureId(1), r),
            Err(DriveTimeError::InvalidOrigin(GeometryError::OutOfRange { .. }))
        ));
        assert!(!gate.is_pending(GestureId(1)));
    }

    #[test]
    fn provider_failures_surface() {
        let ix = index();
        let gate = DriveTimeGate::new();
        let ticket = gate.begin(&ix, GestureId(3), request()).unwrap();
        let err = gate
            .finish(&ix, ticket, Err(RoutingError::Provider("timeout".into())))
            .unwrap_err();
        assert_eq!(err, DriveTimeError::Routing(RoutingError::Provider("timeout".into())));
    }
}
