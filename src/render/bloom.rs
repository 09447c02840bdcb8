use bytemuck::{bytes_of, Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::shaders::{BLUR_FRAGMENT, COMPOSITE_FRAGMENT, EXTRACT_FRAGMENT, FULLSCREEN_VERTEX};
use super::targets::{linear_sampler, sampler_entry, texture_entry, uniform_entry, ColorTarget};
use crate::composer::BloomParams;

const MIPS: usize = BloomParams::MIP_COUNT;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ExtractUniform {
    values: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct BlurUniform {
    step: [f32; 4],
    kernel: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CompositeUniform {
    weights: [f32; 4],
    last_weight: [f32; 4],
}

impl CompositeUniform {
    fn from_bloom(bloom: Option<&BloomParams>) -> Self {
        let Some(bloom) = bloom else {
            return Self::zeroed();
        };
        let w = bloom.mip_weights().map(|weight| weight * bloom.strength);
        Self {
            weights: [w[0], w[1], w[2], w[3]],
            last_weight: [w[4], 0.0, 0.0, 0.0],
        }
    }
}

/// High-pass, mip blur chain and final composite onto the surface.
///
/// The composite pass always runs, so without a bloom pass it is a plain
/// copy of the scene target.
pub(crate) struct PostProcess {
    source_layout: wgpu::BindGroupLayout,
    mips_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    extract_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,
    extract_buffer: wgpu::Buffer,
    composite_buffer: wgpu::Buffer,
    hdr_format: wgpu::TextureFormat,
    chain: BloomChain,
}

struct BlurLevel {
    horizontal: ColorTarget,
    vertical: ColorTarget,
    horizontal_group: wgpu::BindGroup,
    vertical_group: wgpu::BindGroup,
}

struct BloomChain {
    bright: ColorTarget,
    extract_group: wgpu::BindGroup,
    levels: Vec<BlurLevel>,
    composite_source: wgpu::BindGroup,
    composite_mips: wgpu::BindGroup,
}

impl PostProcess {
    pub(crate) fn new(
        device: &wgpu::Device,
        hdr_format: wgpu::TextureFormat,
        output_format: wgpu::TextureFormat,
        scene: &ColorTarget,
    ) -> Self {
        let source_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("post-source-layout"),
            entries: &[
                texture_entry(0),
                sampler_entry(1),
                // extract, blur and composite bind differently sized uniforms here
                uniform_entry(2, wgpu::ShaderStages::FRAGMENT, 0),
            ],
        });
        let mips_entries: Vec<_> = (0..MIPS as u32).map(texture_entry).collect();
        let mips_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bloom-mips-layout"),
            entries: &mips_entries,
        });

        let single = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("post-pipeline-layout"),
            bind_group_layouts: &[&source_layout],
            push_constant_ranges: &[],
        });
        let composite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite-pipeline-layout"),
            bind_group_layouts: &[&source_layout, &mips_layout],
            push_constant_ranges: &[],
        });

        let extract_pipeline = fullscreen_pipeline(device, "bloom-extract", EXTRACT_FRAGMENT, &single, hdr_format);
        let blur_pipeline = fullscreen_pipeline(device, "bloom-blur", BLUR_FRAGMENT, &single, hdr_format);
        let composite_pipeline =
            fullscreen_pipeline(device, "bloom-composite", COMPOSITE_FRAGMENT, &composite_layout, output_format);

        let extract_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bloom-extract-uniform"),
            size: std::mem::size_of::<ExtractUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let composite_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bloom-composite-uniform"),
            size: std::mem::size_of::<CompositeUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sampler = linear_sampler(device, "post-sampler");

        let chain = BloomChain::create(
            device,
            &source_layout,
            &mips_layout,
            &sampler,
            &extract_buffer,
            &composite_buffer,
            hdr_format,
            scene,
        );

        Self {
            source_layout,
            mips_layout,
            sampler,
            extract_pipeline,
            blur_pipeline,
            composite_pipeline,
            extract_buffer,
            composite_buffer,
            hdr_format,
            chain,
        }
    }

    /// Rebuilds the mip chain for a new scene target.
    pub(crate) fn resize(&mut self, device: &wgpu::Device, scene: &ColorTarget) {
        self.chain = BloomChain::create(
            device,
            &self.source_layout,
            &self.mips_layout,
            &self.sampler,
            &self.extract_buffer,
            &self.composite_buffer,
            self.hdr_format,
            scene,
        );
    }

    pub(crate) fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        bloom: Option<&BloomParams>,
        output: &wgpu::TextureView,
    ) {
        queue.write_buffer(&self.composite_buffer, 0, bytes_of(&CompositeUniform::from_bloom(bloom)));

        if let Some(bloom) = bloom {
            let extract = ExtractUniform {
                values: [bloom.threshold, BloomParams::SMOOTH_WIDTH, 0.0, 0.0],
            };
            queue.write_buffer(&self.extract_buffer, 0, bytes_of(&extract));

            fullscreen_pass(
                encoder,
                "bloom-extract-pass",
                &self.chain.bright.view,
                &self.extract_pipeline,
                &[&self.chain.extract_group],
            );
            for level in &self.chain.levels {
                fullscreen_pass(
                    encoder,
                    "bloom-blur-horizontal",
                    &level.horizontal.view,
                    &self.blur_pipeline,
                    &[&level.horizontal_group],
                );
                fullscreen_pass(
                    encoder,
                    "bloom-blur-vertical",
                    &level.vertical.view,
                    &self.blur_pipeline,
                    &[&level.vertical_group],
                );
            }
        }

        fullscreen_pass(
            encoder,
            "composite-pass",
            output,
            &self.composite_pipeline,
            &[&self.chain.composite_source, &self.chain.composite_mips],
        );
    }
}

impl BloomChain {
    #[allow(clippy::too_many_arguments)]
    fn create(
        device: &wgpu::Device,
        source_layout: &wgpu::BindGroupLayout,
        mips_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        extract_buffer: &wgpu::Buffer,
        composite_buffer: &wgpu::Buffer,
        format: wgpu::TextureFormat,
        scene: &ColorTarget,
    ) -> Self {
        let source_group = |label: &str, view: &wgpu::TextureView, params: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: source_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };

        let (half_w, half_h) = ((scene.width / 2).max(1), (scene.height / 2).max(1));
        let bright = ColorTarget::create(device, "bloom-bright", half_w, half_h, format);
        let extract_group = source_group("bloom-extract-group", &scene.view, extract_buffer);

        let targets: Vec<(ColorTarget, ColorTarget)> = (0..MIPS)
            .map(|i| {
                let (w, h) = ((half_w >> i).max(1), (half_h >> i).max(1));
                (
                    ColorTarget::create(device, "bloom-horizontal", w, h, format),
                    ColorTarget::create(device, "bloom-vertical", w, h, format),
                )
            })
            .collect();

        let mut levels: Vec<BlurLevel> = Vec::with_capacity(MIPS);
        for (i, (horizontal, vertical)) in targets.into_iter().enumerate() {
            let radius = BloomParams::KERNEL_RADII[i] as f32;
            let texel = [1.0 / horizontal.width as f32, 1.0 / horizontal.height as f32];
            let blur_buffer = |direction: [f32; 2]| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("bloom-blur-uniform"),
                    contents: bytes_of(&BlurUniform {
                        step: [direction[0], direction[1], texel[0], texel[1]],
                        kernel: [radius, radius, 0.0, 0.0],
                    }),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            };
            let input = match levels.last() {
                Some(previous) => &previous.vertical.view,
                None => &bright.view,
            };
            let horizontal_group = source_group("bloom-blur-h-group", input, &blur_buffer([1.0, 0.0]));
            let vertical_group = source_group("bloom-blur-v-group", &horizontal.view, &blur_buffer([0.0, 1.0]));
            levels.push(BlurLevel {
                horizontal,
                vertical,
                horizontal_group,
                vertical_group,
            });
        }

        let composite_source = source_group("composite-source-group", &scene.view, composite_buffer);
        let mip_entries: Vec<_> = levels
            .iter()
            .enumerate()
            .map(|(i, level)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::TextureView(&level.vertical.view),
            })
            .collect();
        let composite_mips = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite-mips-group"),
            layout: mips_layout,
            entries: &mip_entries,
        });

        Self {
            bright,
            extract_group,
            levels,
            composite_source,
            composite_mips,
        }
    }
}

fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    fragment: &str,
    layout: &wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(format!("{FULLSCREEN_VERTEX}{fragment}").into()),
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("vs_fullscreen"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

fn fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    target: &wgpu::TextureView,
    pipeline: &wgpu::RenderPipeline,
    groups: &[&wgpu::BindGroup],
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_pipeline(pipeline);
    for (index, group) in groups.iter().enumerate() {
        pass.set_bind_group(index as u32, *group, &[]);
    }
    pass.draw(0..3, 0..1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BloomConfig;

    #[test]
    fn composite_weights_include_strength() {
        let bloom = BloomParams::new(&BloomConfig::default(), (800, 600));
        let uniform = CompositeUniform::from_bloom(Some(&bloom));
        assert!((uniform.weights[0] - 0.92 * 5.0).abs() < 1e-5);
        assert!((uniform.last_weight[0] - 0.28 * 5.0).abs() < 1e-5);
    }

    #[test]
    fn missing_bloom_pass_adds_nothing() {
        let uniform = CompositeUniform::from_bloom(None);
        assert_eq!(uniform.weights, [0.0; 4]);
        assert_eq!(uniform.last_weight, [0.0; 4]);
    }
}
