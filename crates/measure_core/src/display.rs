use crate::ar::ArSession;
use serde::{Deserialize, Serialize};

/// Display rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    pub fn degrees(self) -> u32 {
        match self {
            DisplayRotation::Rotation0 => 0,
            DisplayRotation::Rotation90 => 90,
            DisplayRotation::Rotation180 => 180,
            DisplayRotation::Rotation270 => 270,
        }
    }
}

/// Tracks the viewport size and rotation, pushing them into the AR session
/// only when they changed since the last frame.
#[derive(Debug, Clone, Default)]
pub struct DisplayGeometry {
    rotation: DisplayRotation,
    width: u32,
    height: u32,
    changed: bool,
}

impl DisplayGeometry {
    /// Stores a new surface size and marks the geometry dirty.
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.changed = true;
    }

    /// Stores a new rotation and marks the geometry dirty.
    pub fn on_rotation_changed(&mut self, rotation: DisplayRotation) {
        if rotation != self.rotation {
            self.rotation = rotation;
            self.changed = true;
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn rotation(&self) -> DisplayRotation {
        self.rotation
    }

    /// Forwards pending geometry to the session. Returns whether anything was sent.
    pub fn update_session<S: ArSession>(&mut self, session: &mut S) -> bool {
        if !self.changed {
            return false;
        }
        session.set_display_geometry(self.rotation, self.width, self.height);
        self.changed = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimSession, SimWorld};

    #[test]
    fn test_geometry_sent_once_per_change() {
        let mut session = SimSession::new(SimWorld::default());
        let mut display = DisplayGeometry::default();
        assert!(!display.update_session(&mut session));

        display.on_surface_changed(1080, 1920);
        assert!(display.update_session(&mut session));
        assert!(!display.update_session(&mut session));
        assert_eq!(session.display_geometry(), (DisplayRotation::Rotation0, 1080, 1920));

        display.on_rotation_changed(DisplayRotation::Rotation0);
        assert!(!display.update_session(&mut session));
        display.on_rotation_changed(DisplayRotation::Rotation90);
        assert!(display.update_session(&mut session));
        assert_eq!(session.display_geometry().0.degrees(), 90);
    }
}
