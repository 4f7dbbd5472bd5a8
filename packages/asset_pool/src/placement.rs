use crate::InstanceId;

/// Coordinate space in which a [`Placement`] is interpreted.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Space {
    /// Position and rotation are world coordinates. This is the default.
    #[default]
    World,

    /// Position and rotation are relative to the parent.
    Local,
}

/// Where an acquired object is put before it is activated.
///
/// The pool does not interpret the values, it hands them to
/// [`PoolObject::place()`][crate::PoolObject::place] before the object is activated.
///
/// # Example
///
/// ```rust
/// use asset_pool::{InstanceId, Placement, Space};
///
/// let placement = Placement::new()
///     .position([1.0, 0.0, 4.0])
///     .parent(InstanceId::new(7))
///     .space(Space::Local);
///
/// assert_eq!(placement.parent_id(), Some(InstanceId::new(7)));
/// assert_eq!(placement.coordinate_space(), Space::Local);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
#[must_use]
pub struct Placement {
    position: [f32; 3],
    rotation: [f32; 4],
    parent: Option<InstanceId>,
    space: Space,
}

/// Quaternion in `[x, y, z, w]` order that represents no rotation.
pub const IDENTITY_ROTATION: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

impl Placement {
    /// A placement at the origin with no rotation, no parent, in world space.
    pub const fn new() -> Self {
        Self {
            position: [0.0; 3],
            rotation: IDENTITY_ROTATION,
            parent: None,
            space: Space::World,
        }
    }

    /// Sets the position.
    pub const fn position(mut self, position: [f32; 3]) -> Self {
        self.position = position;
        self
    }

    /// Sets the rotation as an `[x, y, z, w]` quaternion.
    pub const fn rotation(mut self, rotation: [f32; 4]) -> Self {
        self.rotation = rotation;
        self
    }

    /// Attaches the object to the given parent.
    pub const fn parent(mut self, parent: InstanceId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Selects the coordinate space for position and rotation.
    pub const fn space(mut self, space: Space) -> Self {
        self.space = space;
        self
    }

    /// The position.
    #[must_use]
    pub const fn coordinates(&self) -> [f32; 3] {
        self.position
    }

    /// The rotation as an `[x, y, z, w]` quaternion.
    #[must_use]
    pub const fn orientation(&self) -> [f32; 4] {
        self.rotation
    }

    /// The parent to attach to, if any.
    #[must_use]
    pub const fn parent_id(&self) -> Option<InstanceId> {
        self.parent
    }

    /// The coordinate space of position and rotation.
    #[must_use]
    pub const fn coordinate_space(&self) -> Space {
        self.space
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::new()
    }
}
