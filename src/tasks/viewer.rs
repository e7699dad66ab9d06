use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wgpu::util::DeviceExt;
use wgpu::{self, SurfaceError};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

use crate::error::Error;
use crate::events::DisplayFrame;
use crate::tasks::slideshow::DisplaySink;

/// Hands frames to the windowed viewer running on the main thread.
pub struct ChannelSink {
    size: (u32, u32),
    to_viewer: mpsc::Sender<DisplayFrame>,
}

impl ChannelSink {
    pub fn new(size: (u32, u32), to_viewer: mpsc::Sender<DisplayFrame>) -> Self {
        Self { size, to_viewer }
    }
}

#[async_trait]
impl DisplaySink for ChannelSink {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    async fn present(&mut self, frame: DisplayFrame) -> crate::error::Result<()> {
        if frame.dimensions() != self.size {
            return Err(Error::Display(format!(
                "frame is {}x{}, surface is {}x{}",
                frame.width, frame.height, self.size.0, self.size.1
            )));
        }
        self.to_viewer
            .send(frame)
            .await
            .map_err(|_| Error::Display("viewer is no longer accepting frames".to_string()))
    }
}

#[derive(Debug)]
enum ViewerEvent {
    Frame(DisplayFrame),
    Cancelled,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    pos: [f32; 2],
    uv: [f32; 2],
}

const QUAD: [Vertex; 4] = [
    Vertex {
        pos: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    Vertex {
        pos: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    Vertex {
        pos: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    Vertex {
        pos: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
];

struct PhotoTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vbuf: wgpu::Buffer,
    photo: Option<PhotoTexture>,
}

impl Gpu {
    fn new(window: Arc<Window>) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            ..Default::default()
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("frame-device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            format,
            ..surface
                .get_default_config(&adapter, size.width.max(1), size.height.max(1))
                .context("surface is not supported by the adapter")?
        };
        surface.configure(&device, &config);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "viewer surface configured",
        );

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("photo-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("viewer/photo.wgsl").into()),
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("photo-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("photo-pipeline-layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("photo-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("photo-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("photo-quad"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            pipeline,
            bind_layout,
            sampler,
            vbuf,
            photo: None,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.config.width = size.width.max(1);
        self.config.height = size.height.max(1);
        self.surface.configure(&self.device, &self.config);
        debug!(
            width = self.config.width,
            height = self.config.height,
            "viewer surface resized",
        );
    }

    fn upload(&mut self, frame: &DisplayFrame) {
        let reuse = self
            .photo
            .as_ref()
            .is_some_and(|p| p.width == frame.width && p.height == frame.height);
        if !reuse {
            self.photo = Some(self.create_photo_texture(frame.width, frame.height));
        }
        let Some(photo) = self.photo.as_ref() else {
            return;
        };
        self.queue.write_texture(
            photo.texture.as_image_copy(),
            &frame.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * frame.width),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_photo_texture(&self, width: u32, height: u32) -> PhotoTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("photo"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("photo-bind-group"),
            layout: &self.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        PhotoTexture {
            texture,
            bind_group,
            width,
            height,
        }
    }

    fn draw(&mut self, window: &Window) -> Result<(), SurfaceError> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated | SurfaceError::Lost) => {
                info!("viewer surface lost; reconfiguring");
                self.resize(window.inner_size());
                return Ok(());
            }
            Err(SurfaceError::Timeout) => {
                warn!("viewer surface acquisition timed out");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewer-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("photo-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
            if let Some(photo) = self.photo.as_ref() {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &photo.bind_group, &[]);
                pass.set_vertex_buffer(0, self.vbuf.slice(..));
                pass.draw(0..QUAD.len() as u32, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        window.pre_present_notify();
        frame.present();
        Ok(())
    }
}

struct ViewerApp {
    fullscreen: bool,
    cancel: CancellationToken,
    surface_size_tx: Option<oneshot::Sender<(u32, u32)>>,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    pending: Option<DisplayFrame>,
    failure: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(
        fullscreen: bool,
        cancel: CancellationToken,
        surface_size_tx: oneshot::Sender<(u32, u32)>,
    ) -> Self {
        Self {
            fullscreen,
            cancel,
            surface_size_tx: Some(surface_size_tx),
            window: None,
            gpu: None,
            pending: None,
            failure: None,
        }
    }

    fn create_window(&self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>> {
        let mut attrs = WindowAttributes::default().with_title("Drive Photo Frame");
        if self.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = event_loop
            .create_window(attrs)
            .context("failed to create viewer window")?;
        window.set_cursor_visible(false);
        Ok(Arc::new(window))
    }

    /// Size frames must have: the monitor's native mode when full-screen.
    fn surface_size(&self, window: &Window) -> (u32, u32) {
        let monitor = if self.fullscreen {
            window
                .current_monitor()
                .map(|m| m.size())
                .filter(|s| s.width > 0 && s.height > 0)
        } else {
            None
        };
        let PhysicalSize { width, height } = monitor.unwrap_or_else(|| window.inner_size());
        (width.max(1), height.max(1))
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.cancel.cancel();
        event_loop.exit();
    }

    /// Stop with an error that `run_windowed` hands back to the caller.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!(error = ?err, "viewer stopped on error");
        self.failure.get_or_insert(err);
        self.shutdown(event_loop);
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }
        if self.window.is_some() {
            return;
        }

        let window = match self.create_window(event_loop) {
            Ok(window) => window,
            Err(err) => return self.fail(event_loop, err),
        };
        match Gpu::new(window.clone()).context("failed to initialize GPU state") {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(err) => return self.fail(event_loop, err),
        }

        let size = self.surface_size(&window);
        info!(width = size.0, height = size.1, "display surface ready");
        if let Some(tx) = self.surface_size_tx.take() {
            let _ = tx.send(size);
        }
        self.window = Some(window.clone());
        if let (Some(gpu), Some(frame)) = (self.gpu.as_mut(), self.pending.take()) {
            gpu.upload(&frame);
        }
        window.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("viewer window close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Released
                    && matches!(
                        event.physical_key,
                        PhysicalKey::Code(KeyCode::Escape | KeyCode::KeyQ)
                    )
                {
                    info!("quit key pressed");
                    self.shutdown(event_loop);
                }
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.resize(new_size);
                }
                window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                if let Some(gpu) = self.gpu.as_mut() {
                    if let Err(err) = gpu.draw(&window) {
                        self.fail(
                            event_loop,
                            anyhow::Error::new(err).context("viewer surface failed"),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Frame(frame) => match (self.gpu.as_mut(), self.window.as_ref()) {
                (Some(gpu), Some(window)) => {
                    gpu.upload(&frame);
                    window.request_redraw();
                }
                _ => self.pending = Some(frame),
            },
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                event_loop.exit();
            }
        }
    }
}

/// Run the full-screen viewer on the calling (main) thread.
///
/// The surface size is reported once through `surface_size_tx` as soon as the
/// window exists; frames arriving on `frames` are shown until cancellation or
/// until the window is closed, which also cancels `cancel`.
pub fn run_windowed(
    mut frames: mpsc::Receiver<DisplayFrame>,
    surface_size_tx: oneshot::Sender<(u32, u32)>,
    cancel: CancellationToken,
    fullscreen: bool,
) -> Result<()> {
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let forward_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                select! {
                    _ = cancel.cancelled() => {
                        let _ = proxy.send_event(ViewerEvent::Cancelled);
                        break;
                    }
                    maybe_frame = frames.recv() => {
                        let Some(frame) = maybe_frame else { break };
                        if proxy.send_event(ViewerEvent::Frame(frame)).is_err() {
                            break;
                        }
                    }
                }
            }
        })
    };

    let mut app = ViewerApp::new(fullscreen, cancel, surface_size_tx);
    let run_result = event_loop.run_app(&mut app);
    forward_task.abort();

    viewer_outcome(
        run_result.context("viewer event loop failed"),
        app.failure.take(),
    )
}

/// A startup failure recorded by the app wins over a clean loop exit.
fn viewer_outcome(run: Result<()>, failure: Option<anyhow::Error>) -> Result<()> {
    run?;
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> DisplayFrame {
        DisplayFrame {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        }
    }

    #[test]
    fn startup_failure_is_reported_after_clean_loop_exit() {
        let err = viewer_outcome(Ok(()), Some(anyhow::anyhow!("no adapter"))).unwrap_err();
        assert!(err.to_string().contains("no adapter"));
        assert!(viewer_outcome(Ok(()), None).is_ok());
        let loop_err = viewer_outcome(Err(anyhow::anyhow!("loop")), Some(anyhow::anyhow!("gpu")));
        assert!(loop_err.unwrap_err().to_string().contains("loop"));
    }

    #[tokio::test]
    async fn channel_sink_forwards_frames() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut sink = ChannelSink::new((4, 2), tx);
        assert_eq!(sink.size(), (4, 2));
        sink.present(frame(4, 2)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().dimensions(), (4, 2));
    }

    #[tokio::test]
    async fn channel_sink_rejects_wrong_size_and_closed_viewer() {
        let (tx, rx) = mpsc::channel(1);
        let mut sink = ChannelSink::new((4, 2), tx);
        assert!(matches!(
            sink.present(frame(2, 4)).await,
            Err(Error::Display(_))
        ));
        drop(rx);
        assert!(matches!(
            sink.present(frame(4, 2)).await,
            Err(Error::Display(_))
        ));
    }
}
