//! Model viewer
//!
//! Opens a window and spins a model in front of the camera. The model path is
//! the first command-line argument; without one, two textured quads are shown.
//! Renderer settings are read from `model_viewer.toml` when it exists.

use glfw::{Action, Key, WindowEvent};
use scene_renderer::config::{Config, ConfigError};
use scene_renderer::foundation::logging;
use scene_renderer::foundation::math::{Mat4, Vec3};
use scene_renderer::render::backends::vulkan::{VulkanError, VulkanRenderer, Window, WindowError};
use scene_renderer::render::primitives::MeshData;
use scene_renderer::core::RendererConfig;
use std::time::Instant;

const CONFIG_PATH: &str = "model_viewer.toml";

/// Degrees per second
const SPIN_RATE: f32 = 45.0;

#[derive(thiserror::Error, Debug)]
enum ViewerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Renderer(#[from] VulkanError),
}

struct ModelViewer {
    window: Window,
    renderer: VulkanRenderer,
    model: usize,
    start_time: Instant,
}

impl ModelViewer {
    fn new(model_path: Option<&str>) -> Result<Self, ViewerError> {
        let config = RendererConfig::load_or_default(CONFIG_PATH)?;

        log::info!("Creating window...");
        let window = Window::new(&config.application_name, 800, 600)?;

        log::info!("Creating Vulkan renderer...");
        let mut renderer = VulkanRenderer::init(&window, config)?;

        let model = match model_path {
            Some(path) => {
                log::info!("Loading model {}", path);
                renderer.create_mesh_model(path)?
            }
            None => {
                log::info!("No model given, showing two quads");
                renderer.create_model_from_meshes(&[
                    MeshData::quad([-0.6, 0.0, 0.0], 0.5, [1.0, 0.4, 0.4], 0),
                    MeshData::quad([0.6, 0.0, 0.0], 0.5, [0.4, 0.4, 1.0], 0),
                ])?
            }
        };

        Ok(Self {
            window,
            renderer,
            model,
            start_time: Instant::now(),
        })
    }

    fn run(mut self) -> Result<(), ViewerError> {
        while !self.window.should_close() {
            for event in self.window.poll_events() {
                if let WindowEvent::Key(Key::Escape, _, Action::Press, _) = event {
                    self.window.set_should_close(true);
                }
            }

            // The swapchain is not rebuilt; a resized window ends the viewer.
            self.renderer.check_window_extent(&self.window)?;

            let angle = (self.start_time.elapsed().as_secs_f32() * SPIN_RATE).to_radians();
            self.renderer
                .update_model(self.model, Mat4::new_rotation(Vec3::y() * angle))?;
            self.renderer.draw()?;
        }

        self.renderer.cleanup()?;
        Ok(())
    }
}

fn main() {
    logging::init();

    let model_path = std::env::args().nth(1);
    let result = ModelViewer::new(model_path.as_deref()).and_then(ModelViewer::run);

    if let Err(e) = result {
        log::error!("Model viewer failed: {}", e);
        std::process::exit(1);
    }
}
