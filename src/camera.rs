use cgmath::{InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3};

/// Maps OpenGL clip space (z in [-1, 1]) onto wgpu's (z in [0, 1]).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Perspective camera over a z-up world.
///
/// Viewport changes never mark the projection as changed; only the clip
/// planes do. The terrain projection uniform is rewritten from
/// [`Camera::take_projection_changed`], so resizing alone leaves it alone.
#[derive(Clone, Debug)]
pub struct Camera {
    position: Point3<f32>,
    look: Vector3<f32>,
    up: Vector3<f32>,
    /// Full vertical field of view.
    height_angle: Rad<f32>,
    near: f32,
    far: f32,
    width: u32,
    height: u32,
    projection_changed: bool,
}

impl Camera {
    pub fn new(width: u32, height: u32, near: f32, far: f32) -> Self {
        Self {
            position: Point3::new(0.0, -1.5, 0.6),
            look: Vector3::new(0.0, 1.0, -0.3).normalize(),
            up: Vector3::unit_z(),
            height_angle: Rad(std::f32::consts::FRAC_PI_3),
            near,
            far,
            width: width.max(1),
            height: height.max(1),
            projection_changed: true,
        }
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn look(&self) -> Vector3<f32> {
        self.look
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn clip_planes(&self) -> (f32, f32) {
        (self.near, self.far)
    }

    pub fn set_pose(&mut self, position: Point3<f32>, look: Vector3<f32>) {
        self.position = position;
        if look.magnitude2() > 0.0 {
            self.look = look.normalize();
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        if near != self.near || far != self.far {
            self.near = near;
            self.far = far;
            self.projection_changed = true;
        }
    }

    /// Returns whether the clip planes moved since the last call.
    pub fn take_projection_changed(&mut self) -> bool {
        std::mem::replace(&mut self.projection_changed, false)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn view(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.look, self.up)
    }

    pub fn view_inverse(&self) -> Matrix4<f32> {
        self.view().invert().unwrap_or_else(Matrix4::identity)
    }

    /// Square-aspect perspective; depends on the clip planes only. Consumers
    /// divide clip-space x by [`Camera::aspect_ratio`].
    pub fn projection(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.height_angle, 1.0, self.near, self.far)
    }

    /// Half extent of the image plane at unit distance, vertically.
    pub fn y_max(&self) -> f32 {
        (self.height_angle.0 * 0.5).tan()
    }

    /// Half extent of the image plane at unit distance, horizontally.
    pub fn x_max(&self) -> f32 {
        self.y_max() * self.aspect_ratio()
    }
}
