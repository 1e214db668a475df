// src/occlusion.rs - draw order and buffer writes for the ring and its finger occluder
//
// The occluder is drawn first and writes depth only. The ring follows and is
// depth-tested against it, so the half of the band behind the finger disappears
// while the video stays visible through the transparent background.

use crate::pose::Pose;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Ring,
    Occluder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub kind: ObjectKind,
    pub pose: Pose,
    pub visible: bool,
    pub render_order: i32,
    pub color_write: bool,
    pub depth_write: bool,
    pub depth_test: bool,
}

impl SceneObject {
    fn occluder() -> Self {
        Self {
            kind: ObjectKind::Occluder,
            pose: Pose::default(),
            visible: false,
            render_order: 0,
            color_write: false,
            depth_write: true,
            depth_test: true,
        }
    }

    fn ring() -> Self {
        Self {
            kind: ObjectKind::Ring,
            pose: Pose::default(),
            visible: false,
            render_order: 1,
            color_write: true,
            depth_write: true,
            depth_test: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RingScene {
    objects: [SceneObject; 2],
}

impl RingScene {
    pub fn new() -> Self {
        Self {
            objects: [SceneObject::occluder(), SceneObject::ring()],
        }
    }

    pub fn occluder(&self) -> &SceneObject {
        &self.objects[0]
    }

    pub fn ring(&self) -> &SceneObject {
        &self.objects[1]
    }

    pub fn apply(&mut self, ring: &Pose, occluder: &Pose) {
        self.objects[0].pose = *occluder;
        self.objects[1].pose = *ring;
    }

    /// Ring and occluder always share visibility.
    pub fn set_visible(&mut self, visible: bool) {
        for object in &mut self.objects {
            object.visible = visible;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.objects[1].visible
    }

    /// Visible objects in the order they must be rasterized.
    pub fn draw_list(&self) -> Vec<&SceneObject> {
        let mut list: Vec<&SceneObject> = self.objects.iter().filter(|o| o.visible).collect();
        list.sort_by_key(|o| o.render_order);
        list
    }
}

impl Default for RingScene {
    fn default() -> Self {
        Self::new()
    }
}
