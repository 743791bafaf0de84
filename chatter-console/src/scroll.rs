//! Scroll position policy for the timeline view.

use shared::config::console::{DEFAULT_LOAD_OLDER_THRESHOLD_PX, DEFAULT_NEAR_BOTTOM_THRESHOLD_PX};

use crate::store::{InsertPosition, StoreChange};

/// Geometry of the scrollable timeline, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

impl Viewport {
    #[must_use]
    pub const fn new(scroll_top: f64, client_height: f64, scroll_height: f64) -> Self {
        Self {
            scroll_top,
            client_height,
            scroll_height,
        }
    }

    #[must_use]
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }

    /// Scroll offset that shows the last row.
    #[must_use]
    pub fn bottom_offset(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }
}

/// What the view should do after a timeline mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    None,
    ToBottom,
    /// Set `scroll_top` to this offset.
    RestoreOffset(f64),
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    was_near_bottom: bool,
    scroll_top: f64,
    scroll_height: f64,
}

/// Decides between following new messages and holding the reader's place.
#[derive(Debug, Clone)]
pub struct ScrollAnchor {
    near_bottom_threshold: f64,
    load_older_threshold: f64,
    viewport: Viewport,
    snapshot: Option<Snapshot>,
}

impl Default for ScrollAnchor {
    fn default() -> Self {
        Self::new(DEFAULT_NEAR_BOTTOM_THRESHOLD_PX, DEFAULT_LOAD_OLDER_THRESHOLD_PX)
    }
}

impl ScrollAnchor {
    #[must_use]
    pub const fn new(near_bottom_threshold: f64, load_older_threshold: f64) -> Self {
        Self {
            near_bottom_threshold,
            load_older_threshold,
            viewport: Viewport {
                scroll_top: 0.0,
                client_height: 0.0,
                scroll_height: 0.0,
            },
            snapshot: None,
        }
    }

    /// Record the latest viewport geometry.
    pub fn observe(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    #[must_use]
    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn is_near_bottom(&self) -> bool {
        self.viewport.distance_from_bottom() <= self.near_bottom_threshold
    }

    /// Whether the reader is close enough to the top to fetch older messages.
    #[must_use]
    pub fn should_load_older(&self, viewport: Viewport) -> bool {
        viewport.scroll_top < self.load_older_threshold
    }

    /// Capture the pre-mutation position. Call right before touching the store.
    pub fn before_mutation(&mut self) {
        self.snapshot = Some(Snapshot {
            was_near_bottom: self.is_near_bottom(),
            scroll_top: self.viewport.scroll_top,
            scroll_height: self.viewport.scroll_height,
        });
    }

    /// Decide the scroll reaction to `change`, given the re-rendered height.
    pub fn resolve(&mut self, change: &StoreChange, new_scroll_height: f64) -> ScrollAction {
        let snapshot = self.snapshot.take().unwrap_or(Snapshot {
            was_near_bottom: self.is_near_bottom(),
            scroll_top: self.viewport.scroll_top,
            scroll_height: self.viewport.scroll_height,
        });

        let action = match change {
            StoreChange::Reset { .. } => ScrollAction::ToBottom,
            StoreChange::Prepended { .. } => ScrollAction::RestoreOffset(
                snapshot.scroll_top + (new_scroll_height - snapshot.scroll_height),
            ),
            StoreChange::Inserted { local: true, .. } => ScrollAction::ToBottom,
            StoreChange::Inserted { .. } if snapshot.was_near_bottom => ScrollAction::ToBottom,
            // rows after a mid-timeline insert keep their place on screen
            StoreChange::Inserted {
                position: InsertPosition::Middle,
                ..
            } => ScrollAction::RestoreOffset(
                snapshot.scroll_top + (new_scroll_height - snapshot.scroll_height),
            ),
            StoreChange::Inserted {
                position: InsertPosition::Tail,
                ..
            }
            | StoreChange::Replaced
            | StoreChange::Updated
            | StoreChange::Removed
            | StoreChange::Unchanged => ScrollAction::None,
        };

        self.viewport.scroll_height = new_scroll_height;
        match action {
            ScrollAction::ToBottom => self.viewport.scroll_top = self.viewport.bottom_offset(),
            ScrollAction::RestoreOffset(offset) => self.viewport.scroll_top = offset,
            ScrollAction::None => {}
        }
        action
    }
}
