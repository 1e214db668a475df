// src/render.rs - renderer interface and a software overlay compositor
use anyhow::Result;
use image::{DynamicImage, Rgba, RgbaImage};
use nalgebra::Vector3;
use nalgebra_glm as glm;
use std::f64::consts::TAU;

use crate::camera::CameraModel;
use crate::occlusion::{ObjectKind, RingScene, SceneObject};

pub trait Renderer {
    /// Draws the scene over `frame`. Called once per processed frame.
    fn render(&mut self, scene: &RingScene, camera: &CameraModel, frame: &DynamicImage) -> Result<()>;
    /// Frees everything; the renderer must not be used afterwards.
    fn dispose(&mut self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub ring_samples_drawn: usize,
    pub ring_samples_occluded: usize,
    pub occluder_samples: usize,
}

/// Point-sampled stand-in for the 3D engine.
///
/// The ring is drawn as a band of radius `ring_radius` in its local XY plane; the
/// occluder as a unit cylinder along local Y. Both go through one depth buffer in
/// draw-list order, so the occluder hides the back of the band.
pub struct OverlayRenderer {
    pub ring_color: Rgba<u8>,
    pub ring_radius: f64,
    ring_samples: usize,
    occluder_segments: usize,
    occluder_rings: usize,
    depth: Vec<f64>,
    last_composite: Option<RgbaImage>,
    last_stats: RenderStats,
    disposed: bool,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self {
            ring_color: Rgba([212, 175, 55, 255]),
            ring_radius: 0.65,
            ring_samples: 180,
            occluder_segments: 96,
            occluder_rings: 48,
            depth: Vec::new(),
            last_composite: None,
            last_stats: RenderStats::default(),
            disposed: false,
        }
    }

    /// Most recent video frame with the ring composited on top.
    pub fn last_composite(&self) -> Option<&RgbaImage> {
        self.last_composite.as_ref()
    }

    pub fn last_stats(&self) -> RenderStats {
        self.last_stats
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn local_samples(&self, kind: ObjectKind) -> Vec<Vector3<f64>> {
        match kind {
            ObjectKind::Ring => (0..self.ring_samples)
                .map(|i| {
                    let a = TAU * i as f64 / self.ring_samples as f64;
                    Vector3::new(a.cos(), a.sin(), 0.0) * self.ring_radius
                })
                .collect(),
            ObjectKind::Occluder => {
                let mut points = Vec::with_capacity(self.occluder_segments * (self.occluder_rings + 1));
                for r in 0..=self.occluder_rings {
                    let y = r as f64 / self.occluder_rings as f64 - 0.5;
                    for s in 0..self.occluder_segments {
                        let a = TAU * s as f64 / self.occluder_segments as f64;
                        points.push(Vector3::new(a.cos(), y, a.sin()));
                    }
                }
                points
            }
        }
    }

    fn draw_object(
        &mut self,
        object: &SceneObject,
        canvas: &mut RgbaImage,
        view: &glm::TMat4<f64>,
        proj: &glm::TMat4<f64>,
        near: f64,
        stats: &mut RenderStats,
    ) {
        let (width, height) = canvas.dimensions();
        let viewport = glm::vec4(0.0, 0.0, width as f64, height as f64);
        // occluder splats wider so the sampled surface has no holes
        let splat: i64 = if object.color_write { 1 } else { 3 };

        for local in self.local_samples(object.kind) {
            let world = object.pose.transform_point(&local);
            if world.z > -near {
                continue;
            }
            let win = glm::project(&glm::vec3(world.x, world.y, world.z), view, proj, viewport);
            if !(0.0..=1.0).contains(&win.z) {
                continue;
            }
            let cx = win.x.floor() as i64;
            let cy = (height as f64 - win.y).floor() as i64;

            let mut passed = false;
            for py in cy - splat + 1..cy + splat {
                for px in cx - splat + 1..cx + splat {
                    if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
                        continue;
                    }
                    let idx = py as usize * width as usize + px as usize;
                    if object.depth_test && win.z > self.depth[idx] {
                        continue;
                    }
                    passed = true;
                    if object.depth_write {
                        self.depth[idx] = win.z;
                    }
                    if object.color_write {
                        canvas.put_pixel(px as u32, py as u32, self.ring_color);
                    }
                }
            }

            match object.kind {
                ObjectKind::Occluder => stats.occluder_samples += 1,
                ObjectKind::Ring if passed => stats.ring_samples_drawn += 1,
                ObjectKind::Ring => stats.ring_samples_occluded += 1,
            }
        }
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for OverlayRenderer {
    fn render(&mut self, scene: &RingScene, camera: &CameraModel, frame: &DynamicImage) -> Result<()> {
        if self.disposed {
            anyhow::bail!("renderer already disposed");
        }

        let mut canvas = frame.to_rgba8();
        let (width, height) = canvas.dimensions();
        self.depth.clear();
        self.depth.resize(width as usize * height as usize, 1.0);

        let proj = glm::perspective(camera.aspect, camera.fov_radians(), camera.near, camera.far);
        let view: glm::TMat4<f64> = glm::identity();

        let mut stats = RenderStats::default();
        for object in scene.draw_list() {
            self.draw_object(object, &mut canvas, &view, &proj, camera.near, &mut stats);
        }

        self.last_stats = stats;
        self.last_composite = Some(canvas);
        Ok(())
    }

    fn dispose(&mut self) {
        self.depth = Vec::new();
        self.last_composite = None;
        self.disposed = true;
    }
}
