//! EID routing table.
//!
//! Each entry maps a contiguous EID range onto the link it is reached
//! through. Neighbors occupy a single EID; bridges own a downstream pool.

use heapless::Vec as HVec;
use serde::Serialize;

use super::eid::Eid;
use crate::error::RouteError;

/// Index of a physical link attached to the endpoint.
pub type LinkId = u8;

/// Maximum number of routes held.
pub const MAX_ROUTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    /// Directly attached endpoint.
    Neighbor,
    /// EIDs reached through a bridge on the link.
    Bridged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Route {
    pub first: Eid,
    pub count: u8,
    pub link: LinkId,
    pub kind: RouteKind,
}

impl Route {
    pub fn neighbor(eid: Eid, link: LinkId) -> Self {
        Self {
            first: eid,
            count: 1,
            link,
            kind: RouteKind::Neighbor,
        }
    }

    /// Downstream pool of `count` EIDs behind a bridge on `link`.
    pub fn bridged(first: Eid, count: u8, link: LinkId) -> Self {
        Self {
            first,
            count,
            link,
            kind: RouteKind::Bridged,
        }
    }

    pub fn contains(&self, eid: Eid) -> bool {
        eid.0 >= self.first.0 && u16::from(eid.0) < self.end()
    }

    fn end(&self) -> u16 {
        u16::from(self.first.0) + u16::from(self.count)
    }

    fn overlaps(&self, other: &Route) -> bool {
        u16::from(self.first.0) < other.end() && u16::from(other.first.0) < self.end()
    }
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: HVec<Route, MAX_ROUTES>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, route: Route) -> Result<(), RouteError> {
        if route.count == 0 || route.end() > 0x100 {
            return Err(RouteError::InvalidRange);
        }
        if self.routes.iter().any(|r| r.overlaps(&route)) {
            return Err(RouteError::Overlap);
        }
        self.routes.push(route).map_err(|_| RouteError::TableFull)
    }

    pub fn lookup(&self, eid: Eid) -> Option<&Route> {
        self.routes.iter().find(|r| r.contains(eid))
    }

    /// Remove the route covering `eid`.
    pub fn remove_eid(&mut self, eid: Eid) -> Option<Route> {
        let i = self.routes.iter().position(|r| r.contains(eid))?;
        Some(self.routes.swap_remove(i))
    }

    /// Remove every route through `link`, returning how many were dropped.
    pub fn remove_link(&mut self, link: LinkId) -> usize {
        let before = self.routes.len();
        self.routes.retain(|r| r.link != link);
        before - self.routes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
