// =============================================================================
// VK-VIEWER - textured, spinning model on raw Vulkan
// =============================================================================
//
// FRAME FLOW (see renderer.rs):
// 1. Wait for this frame slot's fence
// 2. Acquire swapchain image
// 3. Update that image's uniform buffer
// 4. Submit the pre-recorded command buffer
// 5. Present, rebuilding the swapchain if it went stale
//
// =============================================================================

mod backend;
mod config;
mod renderer;
mod scene;

use anyhow::Result;
use config::Config;
use renderer::Renderer;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

fn main() -> Result<()> {
    // Logging depends on the config, so load errors are reported afterwards
    let (config, load_error) = Config::load();

    init_logging(&config);
    log::info!("Starting vk-viewer");
    match load_error {
        Some(e) => log::warn!("Failed to load {}: {:#}. Using defaults.", Config::PATH, e),
        None if Path::new(Config::PATH).exists() => {
            log::info!("Loaded configuration from {}", Config::PATH)
        }
        None => log::info!("Config file {} not found, using defaults", Config::PATH),
    }
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(e) = app.error.take() {
        return Err(e);
    }
    Ok(())
}

/// Info by default, `RUST_LOG` overrides; optionally to a file instead of stderr
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info).parse_default_env();

    let mut file_error = None;
    if config.debug.log_to_file {
        match File::create(&config.debug.log_file) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => file_error = Some(e),
        }
    }

    builder.init();

    if let Some(e) = file_error {
        log::warn!("Could not open log file {}: {}", config.debug.log_file, e);
    }
}

/// Frames-per-second over roughly one-second windows
struct FpsCounter {
    frames: u32,
    window_start: Instant,
    last_frame: Instant,
}

impl FpsCounter {
    const INTERVAL: Duration = Duration::from_secs(1);

    fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            window_start: now,
            last_frame: now,
        }
    }

    /// Count a frame; once per interval returns (fps, last frame time in ms)
    fn tick(&mut self, now: Instant) -> Option<(f32, f32)> {
        let frame_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frames += 1;

        let elapsed = now.duration_since(self.window_start);
        if elapsed < Self::INTERVAL {
            return None;
        }

        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = now;
        Some((fps, frame_time * 1000.0))
    }
}

struct App {
    config: Config,
    renderer: Option<Renderer>,
    is_fullscreen: bool,
    quit_key: KeyCode,
    fullscreen_key: KeyCode,
    fps: FpsCounter,
    /// First fatal error, reported once the event loop returns
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            is_fullscreen: config.window.fullscreen,
            quit_key: config.controls.quit_key(),
            fullscreen_key: config.controls.fullscreen_key(),
            fps: FpsCounter::new(Instant::now()),
            renderer: None,
            error: None,
            config,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer {
            if let Err(e) = renderer.device().wait_idle() {
                log::error!("{:#}", e);
            }
        }
        event_loop.exit();
    }

    fn toggle_fullscreen(&mut self) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };

        self.is_fullscreen = !self.is_fullscreen;
        let window = renderer.window();
        if self.is_fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            log::info!("Entered fullscreen mode");
        } else {
            window.set_fullscreen(None);
            log::info!("Exited fullscreen mode");
        }

        let size = window.inner_size();
        renderer.resized(size.width, size.height);
    }

    fn update_title(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }
        let Some(renderer) = &self.renderer else {
            return;
        };

        if let Some((fps, frame_ms)) = self.fps.tick(Instant::now()) {
            let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
            renderer.window().set_title(&format!(
                "{} - {:.0} FPS ({:.2}ms) [{}]",
                self.config.window.title, fps, frame_ms, mode
            ));
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_resizable(self.config.window.resizable)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window: Arc<Window> = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::anyhow!("Failed to create window: {}", e));
                return;
            }
        };

        match Renderer::new(window, &self.config) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => self.fail(event_loop, e.context("Failed to initialize Vulkan")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = &mut self.renderer {
                    renderer.resized(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                match renderer.draw_frame() {
                    Ok(true) => self.update_title(),
                    Ok(false) => {}
                    Err(e) => self.fail(event_loop, e.context("Render error")),
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if !event.state.is_pressed() || event.repeat {
                    return;
                }
                if let PhysicalKey::Code(key) = event.physical_key {
                    if key == self.quit_key {
                        log::info!("{:?} pressed, exiting...", key);
                        self.shutdown(event_loop);
                    } else if key == self.fullscreen_key {
                        self.toggle_fullscreen();
                    }
                }
            }

            _ => {}
        }
    }

    /// Keep redrawing as fast as presentation allows
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer {
            if !renderer.is_minimized() {
                renderer.window().request_redraw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Tear down while the window still exists
        self.renderer = None;
        log::info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_reported_once_per_second() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(start);

        for i in 1..60 {
            assert!(fps.tick(start + Duration::from_millis(i * 16)).is_none());
        }

        let (rate, frame_ms) = fps.tick(start + Duration::from_millis(1000)).unwrap();
        assert!((rate - 60.0).abs() < 0.01);
        assert!((frame_ms - 56.0).abs() < 0.01);

        // Window restarts after reporting
        assert!(fps.tick(start + Duration::from_millis(1016)).is_none());
    }
}
