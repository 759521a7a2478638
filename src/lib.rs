pub mod assets;
pub mod camera;
pub mod cpu_volume;
pub mod density_pass;
pub mod dirty;
pub mod error;
pub mod noise;
pub mod pipeline;
pub mod point_buffer;
pub mod preview_pass;
pub mod render_context;
pub mod scene;
pub mod settings;
pub mod shaders;
pub mod terrain;
pub mod terrain_pass;
pub mod uniforms;
pub mod volume;
pub mod volumetric_pass;
pub mod worley;

use std::sync::Arc;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use web_time::{Duration, Instant};
use winit::{
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{Key, NamedKey},
    window::WindowBuilder,
};

use crate::assets::SkyImages;
use crate::error::{CloudscapeError, Result};
use crate::render_context::RenderContext;
use crate::scene::Scene;
use crate::settings::{LightData, Settings};

const SUN_STEP_DEGREES: f32 = 5.0;
const CAMERA_STEP: f32 = 0.1;
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Frame rate over a sliding window, logged periodically.
struct FrameStats {
    window_start: Instant,
    frames: u32,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
        }
    }

    fn frame_rendered(&mut self) {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= STATS_INTERVAL {
            log::info!(
                "{} frames in {:.1}s ({:.1} fps)",
                self.frames,
                elapsed.as_secs_f32(),
                self.frames as f32 / elapsed.as_secs_f32()
            );
            *self = Self::new();
        }
    }
}

/// What a key press asks of the event loop.
#[derive(Debug, PartialEq, Eq)]
enum KeyAction {
    Continue,
    Exit,
}

fn step_camera(scene: &mut Scene, sign: f32) {
    let look = scene.camera().look();
    let position = scene.camera().position() + look * (sign * CAMERA_STEP);
    scene.set_camera_pose(position, look);
}

fn apply_key(scene: &mut Scene, key: &Key) -> KeyAction {
    let light = scene.config().settings().light;
    match key {
        Key::Named(NamedKey::Escape) => return KeyAction::Exit,
        Key::Named(NamedKey::ArrowLeft) => scene.config_mut().set_light(LightData::sun(
            light.longitude - SUN_STEP_DEGREES,
            light.latitude,
            light.color,
        )),
        Key::Named(NamedKey::ArrowRight) => scene.config_mut().set_light(LightData::sun(
            light.longitude + SUN_STEP_DEGREES,
            light.latitude,
            light.color,
        )),
        Key::Named(NamedKey::ArrowUp) => scene.config_mut().set_light(LightData::sun(
            light.longitude,
            (light.latitude + SUN_STEP_DEGREES).min(90.0),
            light.color,
        )),
        Key::Named(NamedKey::ArrowDown) => scene.config_mut().set_light(LightData::sun(
            light.longitude,
            (light.latitude - SUN_STEP_DEGREES).max(-90.0),
            light.color,
        )),
        Key::Character(c) => match c.to_lowercase().as_str() {
            "h" => {
                let shown = scene.toggle_terrain_preview();
                log::info!("terrain preview {}", if shown { "on" } else { "off" });
            }
            "r" => {
                let seed = scene.config().settings().point_seed.wrapping_add(1);
                scene.config_mut().set_point_seed(seed);
                log::info!("reseeding cloud noise with {:#x}", seed);
            }
            "w" => step_camera(scene, 1.0),
            "s" => step_camera(scene, -1.0),
            _ => {}
        },
        _ => {}
    }
    KeyAction::Continue
}

fn load_sky(settings: &Settings) -> Result<SkyImages> {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            let _ = settings;
            SkyImages::embedded()
        } else {
            SkyImages::load_from_dir(&settings.asset_dir)
        }
    }
}

async fn arun() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            console_log::init_with_level(log::Level::Debug).expect("Couldn't initialize logger");
        } else {
            env_logger::init();
        }
    }

    let event_loop = EventLoop::new().expect("Couldn't create event loop");
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Cloudscape")
            .build(&event_loop)
            .expect("Couldn't create window"),
    );

    #[cfg(target_arch = "wasm32")]
    {
        // Winit prevents sizing with CSS, so we have to set
        // the size manually when on web.
        use winit::dpi::PhysicalSize;
        let _ = window.request_inner_size(PhysicalSize::new(800, 600));

        use winit::platform::web::WindowExtWebSys;
        web_sys::window()
            .and_then(|win| win.document())
            .and_then(|doc| {
                let dst = doc.get_element_by_id("wasm-example")?;
                let canvas = web_sys::Element::from(window.canvas()?);
                dst.append_child(&canvas).ok()?;
                Some(())
            })
            .expect("Couldn't append canvas to document body.");
    }

    let settings = Settings::default();
    let started = Instant::now();
    let (mut context, mut scene) = match start(window.clone(), settings).await {
        Ok(started) => started,
        Err(err) => {
            log::error!("start-up failed: {}", err);
            return;
        }
    };
    log::info!("first generation pass took {:.2}s", started.elapsed().as_secs_f32());

    let mut stats = FrameStats::new();

    event_loop
        .run(move |event, target| {
            if let Event::AboutToWait = event {
                if let Err(err) = scene.update(&mut context) {
                    log::warn!("regeneration incomplete, retrying next frame: {}", err);
                }
                match scene.render_frame(&mut context) {
                    Ok(()) => stats.frame_rendered(),
                    Err(err @ CloudscapeError::RepeatedDeviceFailure { .. }) => {
                        log::error!("{}", err);
                        target.exit();
                    }
                    Err(err) => log::warn!("frame skipped: {}", err),
                }
                window.request_redraw();
            };

            if let Event::WindowEvent {
                window_id: _,
                event,
            } = event
            {
                match event {
                    WindowEvent::Resized(new_size) => {
                        context.resize_surface(new_size.width, new_size.height);
                        let (width, height) = context.surface_size();
                        if let Err(err) = scene.resize(&mut context, width, height) {
                            log::error!("resize to {}x{} failed: {}", width, height, err);
                        }
                    }
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                logical_key,
                                state: ElementState::Pressed,
                                ..
                            },
                        ..
                    } => {
                        if apply_key(&mut scene, &logical_key) == KeyAction::Exit {
                            target.exit();
                        }
                    }
                    WindowEvent::CloseRequested => target.exit(),
                    _ => {}
                };
            }
        })
        .expect("Event loop failed");
}

async fn start(window: Arc<winit::window::Window>, settings: Settings) -> Result<(RenderContext, Scene)> {
    let sky = load_sky(&settings)?;
    let mut context = RenderContext::new(window, &settings, &sky).await?;
    let (width, height) = context.surface_size();
    let mut scene = Scene::new(settings, width, height)?;
    scene.initialize(&mut context)?;
    Ok((context, scene))
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(start))]
pub fn run() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            wasm_bindgen_futures::spawn_local(arun());
        } else {
            pollster::block_on(arun());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirty::GenerationKey;
    use crate::scene::testkit::small_settings;
    use crate::settings::NoiseTier;

    fn scene() -> Scene {
        Scene::new(small_settings(), 64, 48).unwrap()
    }

    #[test]
    fn test_escape_exits() {
        let mut scene = scene();
        assert_eq!(apply_key(&mut scene, &Key::Named(NamedKey::Escape)), KeyAction::Exit);
        assert_eq!(apply_key(&mut scene, &Key::Character("x".into())), KeyAction::Continue);
    }

    #[test]
    fn test_preview_key_marks_render_params() {
        let mut scene = scene();
        apply_key(&mut scene, &Key::Character("H".into()));
        assert!(scene.config().settings().show_terrain_preview);
        assert!(scene.config().dirty().is_dirty(GenerationKey::RenderParams));
    }

    #[test]
    fn test_reseed_marks_every_channel() {
        let mut scene = scene();
        let seed = scene.config().settings().point_seed;
        apply_key(&mut scene, &Key::Character("r".into()));
        assert_eq!(scene.config().settings().point_seed, seed + 1);
        assert!(scene.config().dirty().is_dirty(GenerationKey::Noise { tier: NoiseTier::Detail, channel: 3 }));
        assert!(!scene.config().dirty().is_dirty(GenerationKey::Terrain));
    }

    #[test]
    fn test_arrows_move_the_sun() {
        let mut scene = scene();
        let before = scene.config().settings().light;
        apply_key(&mut scene, &Key::Named(NamedKey::ArrowRight));
        apply_key(&mut scene, &Key::Named(NamedKey::ArrowUp));
        let after = scene.config().settings().light;
        assert_eq!(after.longitude, before.longitude + SUN_STEP_DEGREES);
        assert_eq!(after.latitude, before.latitude + SUN_STEP_DEGREES);
    }

    #[test]
    fn test_forward_key_moves_camera_along_look() {
        let mut scene = scene();
        let before = scene.camera().position();
        apply_key(&mut scene, &Key::Character("w".into()));
        let moved = scene.camera().position() - before;
        let expected = scene.camera().look() * CAMERA_STEP;
        assert!((moved.x - expected.x).abs() < 1e-6);
        assert!((moved.z - expected.z).abs() < 1e-6);
    }
}
