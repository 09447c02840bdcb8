use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use log::{info, warn};
use wgpu::util::DeviceExt;

use super::bloom::PostProcess;
use super::common::{CameraParams, LightParams};
use super::shaders::SCENE_SHADER;
use super::targets::{sampler_entry, texture_entry, uniform_entry, ColorTarget, DepthBuffer};
use crate::composer::{Frame, FrameSink, Viewport};
use crate::environment::EnvironmentMap;
use crate::geometry::{Mesh, FLOATS_PER_VERTEX};
use crate::material::{ResolvedMaterial, ShadingModel};
use crate::scene::NodeKind;

/// wgpu renderer drawing the scene into an HDR target and running the
/// post-processing chain onto the surface.
pub struct GpuRenderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    viewport: Viewport,
    hdr_format: wgpu::TextureFormat,
    max_texture_dimension: u32,
    depth: DepthBuffer,
    scene_target: ColorTarget,
    pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    environment_layout: wgpu::BindGroupLayout,
    environment_sampler: wgpu::Sampler,
    placeholder_environment: wgpu::BindGroup,
    environments: HashMap<usize, EnvironmentBinding>,
    meshes: HashMap<usize, MeshBuffers>,
    objects: Vec<ObjectBinding>,
    post: PostProcess,
}

impl GpuRenderer {
    /// Initializes the GPU for `target`, sized to `viewport`.
    pub async fn new(target: impl Into<wgpu::SurfaceTarget<'static>>, viewport: Viewport) -> Result<Self> {
        let (width, height) = viewport.physical_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: if cfg!(target_arch = "wasm32") {
                wgpu::Backends::GL
            } else {
                wgpu::Backends::PRIMARY
            },
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(target)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let required_limits = if cfg!(target_arch = "wasm32") {
            wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
        } else {
            wgpu::Limits::default()
        };
        let max_texture_dimension = required_limits.max_texture_dimension_2d;
        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("glyphglow-device"),
            required_features: wgpu::Features::empty(),
            required_limits,
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let hdr_format = pick_hdr_format(&adapter);
        info!("GPU ready: surface {surface_format:?}, scene target {hdr_format:?}, {width}x{height}");

        let depth = DepthBuffer::create(&device, width, height);
        let scene_target = ColorTarget::create(&device, "scene-hdr", width, height, hdr_format);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scene-shader"),
            source: wgpu::ShaderSource::Wgsl(SCENE_SHADER.into()),
        });

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global-bind-layout"),
            entries: &[uniform_entry(
                0,
                wgpu::ShaderStages::VERTEX_FRAGMENT,
                std::mem::size_of::<GlobalUniform>(),
            )],
        });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[uniform_entry(
                0,
                wgpu::ShaderStages::VERTEX_FRAGMENT,
                std::mem::size_of::<ObjectConstants>(),
            )],
        });
        let environment_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("environment-bind-layout"),
            entries: &[texture_entry(0), sampler_entry(1)],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout, &environment_layout],
            push_constant_ranges: &[],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("scene-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: (FLOATS_PER_VERTEX * std::mem::size_of::<f32>()) as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        },
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: (3 * std::mem::size_of::<f32>()) as u64,
                            shader_location: 1,
                        },
                    ],
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: hdr_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let environment_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("environment-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let placeholder = EnvironmentMap {
            width: 1,
            height: 1,
            pixels: vec![0.0; 3],
            mapping: Default::default(),
        };
        let placeholder_environment = upload_environment(
            &device,
            &queue,
            &environment_layout,
            &environment_sampler,
            &placeholder,
        );

        let post = PostProcess::new(&device, hdr_format, surface_format, &scene_target);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            viewport,
            hdr_format,
            max_texture_dimension,
            depth,
            scene_target,
            pipeline,
            global_buffer,
            global_bind_group,
            object_layout,
            environment_layout,
            environment_sampler,
            placeholder_environment,
            environments: HashMap::new(),
            meshes: HashMap::new(),
            objects: Vec::new(),
            post,
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn reconfigure(&mut self) {
        let (width, height) = self.viewport.physical_size();
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, width, height);
        self.scene_target = ColorTarget::create(&self.device, "scene-hdr", width, height, self.hdr_format);
        self.post.resize(&self.device, &self.scene_target);
    }

    fn update_globals(&self, camera: &CameraParams, light: Option<&LightParams>) {
        let uniform = match light {
            Some(light) => GlobalUniform {
                view_proj: camera.view_proj.to_cols_array_2d(),
                camera_position: camera.position.extend(1.0).into(),
                light_position: light.position.extend(1.0).into(),
                light_color: light.color.extend(light.intensity).into(),
                light_params: [light.distance, light.decay, 1.0, 0.0],
            },
            None => GlobalUniform {
                view_proj: camera.view_proj.to_cols_array_2d(),
                camera_position: camera.position.extend(1.0).into(),
                light_position: [0.0; 4],
                light_color: [0.0; 4],
                light_params: [0.0; 4],
            },
        };
        self.queue.write_buffer(&self.global_buffer, 0, bytes_of(&uniform));
    }

    fn ensure_mesh(&mut self, mesh: &Arc<Mesh>) -> usize {
        let key = Arc::as_ptr(mesh) as usize;
        if !self.meshes.contains_key(&key) {
            let buffers = MeshBuffers::from_mesh(&self.device, mesh);
            self.meshes.insert(key, buffers);
        }
        key
    }

    /// Grows the per-node uniform slots so `index` exists. Slots persist
    /// across frames and are rewritten in place.
    fn ensure_object_slot(&mut self, index: usize) {
        while self.objects.len() <= index {
            let binding = ObjectBinding::new(&self.device, &self.object_layout);
            self.objects.push(binding);
        }
    }

    fn ensure_environment(&mut self, map: &Arc<EnvironmentMap>) -> usize {
        let key = Arc::as_ptr(map) as usize;
        if !self.environments.contains_key(&key) {
            let fitted = map.fit_within(self.max_texture_dimension);
            if fitted.width != map.width {
                warn!(
                    "environment map {}x{} exceeds the GPU limit, uploading {}x{}",
                    map.width, map.height, fitted.width, fitted.height
                );
            }
            let bind_group = upload_environment(
                &self.device,
                &self.queue,
                &self.environment_layout,
                &self.environment_sampler,
                &fitted,
            );
            info!("uploaded environment map {}x{}", fitted.width, fitted.height);
            self.environments.insert(
                key,
                EnvironmentBinding {
                    _map: Arc::clone(map),
                    bind_group,
                },
            );
        }
        key
    }
}

impl FrameSink for GpuRenderer {
    fn resize(&mut self, viewport: Viewport) {
        if viewport.width == 0 || viewport.height == 0 {
            return;
        }
        self.viewport = viewport;
        self.reconfigure();
    }

    fn draw(&mut self, frame: &Frame<'_>) -> Result<()> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(anyhow!("GPU is out of memory")),
            Err(wgpu::SurfaceError::Timeout) => {
                info!("Surface timeout; retrying next frame");
                return Ok(());
            }
            Err(err) => {
                warn!("Surface unavailable ({err}); skipping frame");
                return Ok(());
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let stage = frame.stage;
        let camera = CameraParams {
            view_proj: stage.camera.view_proj(),
            position: stage.camera.position,
        };
        let light = stage.scene.lights().next().map(|(node, light)| LightParams {
            position: node.transform.position,
            color: light.color,
            intensity: light.intensity,
            distance: light.distance,
            decay: light.decay,
        });
        self.update_globals(&camera, light.as_ref());

        let mut draw_list = Vec::new();
        if frame.renders_scene() {
            for node in stage.scene.nodes() {
                let NodeKind::Mesh { mesh, material, .. } = &node.kind else {
                    continue;
                };
                if mesh.indices.is_empty() {
                    continue;
                }
                let resolved = material.resolve();
                let mesh_key = self.ensure_mesh(mesh);
                let environment_key = resolved
                    .environment
                    .as_ref()
                    .map(|map| self.ensure_environment(map));

                let constants = ObjectConstants::new(node.transform.matrix(), &resolved);
                let slot = draw_list.len();
                self.ensure_object_slot(slot);
                self.queue
                    .write_buffer(&self.objects[slot].buffer, 0, bytes_of(&constants));
                draw_list.push((mesh_key, environment_key, slot));
            }
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.scene_target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.global_bind_group, &[]);
            for &(mesh_key, environment_key, slot) in &draw_list {
                let Some(mesh) = self.meshes.get(&mesh_key) else {
                    continue;
                };
                let environment = environment_key
                    .and_then(|key| self.environments.get(&key))
                    .map(|binding| &binding.bind_group)
                    .unwrap_or(&self.placeholder_environment);
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.set_bind_group(1, &self.objects[slot].bind_group, &[]);
                pass.set_bind_group(2, environment, &[]);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        self.post.encode(&mut encoder, &self.queue, frame.bloom(), &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn pick_hdr_format(adapter: &wgpu::Adapter) -> wgpu::TextureFormat {
    let preferred = wgpu::TextureFormat::Rgba16Float;
    let features = adapter.get_texture_format_features(preferred);
    let usable = features
        .allowed_usages
        .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
        && features.flags.contains(wgpu::TextureFormatFeatureFlags::FILTERABLE);
    if usable {
        preferred
    } else {
        warn!("{preferred:?} is not renderable here; bloom falls back to 8-bit targets");
        wgpu::TextureFormat::Rgba8Unorm
    }
}

fn upload_environment(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    map: &EnvironmentMap,
) -> wgpu::BindGroup {
    let size = wgpu::Extent3d {
        width: map.width,
        height: map.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("environment-texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgb9e5Ufloat,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let texels = map.to_rgb9e5();
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(&texels),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * map.width),
            rows_per_image: Some(map.height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("environment-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

struct EnvironmentBinding {
    _map: Arc<EnvironmentMap>,
    bind_group: wgpu::BindGroup,
}

struct ObjectBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl ObjectBinding {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("object-uniform"),
            size: std::mem::size_of::<ObjectConstants>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("object-bind-group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { buffer, bind_group }
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &Mesh) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    light_position: [f32; 4],
    light_color: [f32; 4],
    light_params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    base_color: [f32; 4],
    emission: [f32; 4],
    specular: [f32; 4],
    surface: [f32; 4],
}

impl ObjectConstants {
    fn new(model: Mat4, material: &ResolvedMaterial) -> Self {
        let normal = Mat3::from_mat4(model).inverse().transpose();
        let model_id = match material.model {
            ShadingModel::Phong => 0.0,
            ShadingModel::Standard => 1.0,
        };
        let has_environment = if material.environment.is_some() { 1.0 } else { 0.0 };
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            base_color: material.color.extend(model_id).into(),
            emission: material.emission.extend(has_environment).into(),
            specular: material.specular.extend(material.shininess).into(),
            surface: Vec3::new(material.roughness, material.metalness, material.reflectivity)
                .extend(0.0)
                .into(),
        }
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;

    #[test]
    fn uniforms_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<GlobalUniform>(), 128);
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 176);
    }

    #[test]
    fn object_slots_accept_in_place_writes() {
        let size = std::mem::size_of::<ObjectConstants>() as wgpu::BufferAddress;
        assert_eq!(size % wgpu::COPY_BUFFER_ALIGNMENT, 0);
        assert_eq!(size % 16, 0);
        assert_eq!(bytes_of(&ObjectConstants::zeroed()).len() as wgpu::BufferAddress, size);
    }

    #[test]
    fn object_constants_encode_material() {
        let material = Material::Standard {
            color: Vec3::ONE,
            roughness: 0.2,
            metalness: 1.0,
            emissive: Vec3::ONE,
            emissive_intensity: 5.0,
            environment: None,
        };
        let constants = ObjectConstants::new(Mat4::from_scale(Vec3::splat(0.4)), &material.resolve());
        assert_eq!(constants.base_color[3], 1.0);
        assert_eq!(constants.emission, [5.0, 5.0, 5.0, 0.0]);
        assert_eq!([constants.surface[0], constants.surface[1]], [0.2, 1.0]);
        // inverse transpose of a uniform scale
        assert!((constants.normal[0][0] - 2.5).abs() < 1e-5);
    }
}
