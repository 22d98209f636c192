use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Vec3};
use log::{debug, error};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::{draw_items, DrawItem, LightParams, MeshSource};
use crate::camera::CameraParams;
use crate::effects::EffectInstance;
use crate::model::{ModelTree, NodeId};
use crate::obj::ObjMesh;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.03,
    g: 0.03,
    b: 0.05,
    a: 1.0,
};
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;
const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

/// wgpu front end for the body model and the click/victory effects.
///
/// Every organ mesh gets its GPU buffers and its own uniform slot on first
/// sight; effect cubes share a pool of slots that only ever grows. Both are
/// dropped when the scene generation changes.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: wgpu::TextureView,
    opaque: wgpu::RenderPipeline,
    translucent: wgpu::RenderPipeline,
    frame: UniformSlot,
    slot_layout: wgpu::BindGroupLayout,
    nodes: HashMap<NodeId, NodeResources>,
    effect_slots: Vec<UniformSlot>,
    cube: MeshBuffers,
    generation: u64,
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(Arc::clone(&window))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("anatomy-device"),
                ..Default::default()
            })
            .await
            .context("failed to create GPU device")?;

        let mut config = surface
            .get_default_config(&adapter, size.width, size.height)
            .context("window surface is not supported by the GPU adapter")?;
        config.present_mode = wgpu::PresentMode::AutoVsync;
        surface.configure(&device, &config);
        debug!("surface {:?} {}x{}", config.format, config.width, config.height);

        let frame_layout = uniform_layout(&device, "frame-layout", size_of::<FrameUniform>());
        let slot_layout = uniform_layout(&device, "object-layout", size_of::<ObjectUniform>());
        let frame = UniformSlot::new(&device, &frame_layout, size_of::<FrameUniform>(), "frame");

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("anatomy-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("anatomy-pipeline-layout"),
            bind_group_layouts: &[&frame_layout, &slot_layout],
            push_constant_ranges: &[],
        });
        let opaque = create_pipeline(&device, &layout, &shader, config.format, Blending::Opaque);
        let translucent =
            create_pipeline(&device, &layout, &shader, config.format, Blending::Translucent);

        let depth = depth_view(&device, config.width, config.height);
        let cube = MeshBuffers::upload(&device, &unit_cube(), "effect-cube");

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth,
            opaque,
            translucent,
            frame,
            slot_layout,
            nodes: HashMap::new(),
            effect_slots: Vec::new(),
            cube,
            generation: 0,
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.config.width, self.config.height)
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = depth_view(&self.device, size.width, size.height);
    }

    /// Releases GPU meshes uploaded for a previous model.
    pub fn sync_scene(&mut self, generation: u64) {
        if self.generation != generation {
            debug!("releasing {} organ mesh(es)", self.nodes.len());
            self.nodes.clear();
            self.effect_slots.clear();
            self.generation = generation;
        }
    }

    pub fn update_globals(&self, camera: &CameraParams, light: &LightParams) {
        let uniform = FrameUniform {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            light_position: light.position.extend(1.0).into(),
            light_color: light.color.extend(light.intensity).into(),
        };
        self.queue
            .write_buffer(&self.frame.buffer, 0, bytes_of(&uniform));
    }

    /// Draws the visible model meshes, then the effect cubes, translucent items last.
    pub fn render(
        &mut self,
        model: Option<&ModelTree>,
        effects: &[EffectInstance],
    ) -> Result<(), wgpu::SurfaceError> {
        let items = draw_items(model, effects);
        self.prepare(model, &items);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("anatomy-frame"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("anatomy-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_pipeline(&self.opaque);
            pass.set_bind_group(0, &self.frame.bind_group, &[]);

            let mut cubes = self.effect_slots.iter();
            let mut blending = false;
            for item in &items {
                let (mesh, slot) = match item.mesh {
                    MeshSource::Node(id) => match self.nodes.get(&id) {
                        Some(node) => (&node.mesh, &node.slot),
                        None => continue,
                    },
                    MeshSource::Cube => match cubes.next() {
                        Some(slot) => (&self.cube, slot),
                        None => continue,
                    },
                };
                if item.is_translucent() && !blending {
                    pass.set_pipeline(&self.translucent);
                    blending = true;
                }
                pass.set_bind_group(1, &slot.bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
        self.queue.submit([encoder.finish()]);
        output.present();
        Ok(())
    }

    /// Uploads meshes seen for the first time and writes this frame's per-item uniforms.
    fn prepare(&mut self, model: Option<&ModelTree>, items: &[DrawItem]) {
        let mut cube = 0;
        for item in items {
            match item.mesh {
                MeshSource::Node(id) => {
                    let Some(tree) = model else { continue };
                    if !self.nodes.contains_key(&id) {
                        let node = tree.node(id);
                        match node.geometry.as_ref() {
                            Some(mesh) if !mesh.indices.is_empty() => {
                                let resources = NodeResources {
                                    mesh: MeshBuffers::upload(&self.device, mesh, &node.name),
                                    slot: self.object_slot(&node.name),
                                };
                                self.nodes.insert(id, resources);
                            }
                            _ => {
                                error!("node {} has no drawable geometry", node.name);
                                continue;
                            }
                        }
                    }
                    if let Some(node) = self.nodes.get(&id) {
                        node.slot.write_object(&self.queue, item);
                    }
                }
                MeshSource::Cube => {
                    if cube == self.effect_slots.len() {
                        let slot = self.object_slot("effect");
                        self.effect_slots.push(slot);
                    }
                    self.effect_slots[cube].write_object(&self.queue, item);
                    cube += 1;
                }
            }
        }
    }

    fn object_slot(&self, label: &str) -> UniformSlot {
        UniformSlot::new(
            &self.device,
            &self.slot_layout,
            size_of::<ObjectUniform>(),
            label,
        )
    }
}

struct NodeResources {
    mesh: MeshBuffers,
    slot: UniformSlot,
}

/// A uniform buffer together with the bind group exposing it.
struct UniformSlot {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl UniformSlot {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, size: usize, label: &str) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}-uniform")),
            size: size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-bind-group")),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { buffer, bind_group }
    }

    fn write_object(&self, queue: &wgpu::Queue, item: &DrawItem) {
        let normal = Mat3::from_mat4(item.model).inverse().transpose();
        let [x, y, z] = normal.to_cols_array_2d();
        let uniform = ObjectUniform {
            model: item.model.to_cols_array_2d(),
            normal: [
                [x[0], x[1], x[2], 0.0],
                [y[0], y[1], y[2], 0.0],
                [z[0], z[1], z[2], 0.0],
            ],
            color: item.color.into(),
        };
        queue.write_buffer(&self.buffer, 0, bytes_of(&uniform));
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn upload(device: &wgpu::Device, mesh: &ObjMesh, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
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

#[derive(Clone, Copy, PartialEq, Eq)]
enum Blending {
    Opaque,
    /// Alpha blended and not writing depth, so organs stay visible through skin.
    Translucent,
}

fn uniform_layout(device: &wgpu::Device, label: &str, size: usize) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(size as u64),
            },
            count: None,
        }],
    })
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    blending: Blending,
) -> wgpu::RenderPipeline {
    let translucent = blending == Blending::Translucent;
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(if translucent {
            "translucent-pipeline"
        } else {
            "opaque-pipeline"
        }),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: (6 * size_of::<f32>()) as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &VERTEX_ATTRIBUTES,
            }],
        },
        // Meshes exported from anatomy packages are not consistently wound.
        primitive: wgpu::PrimitiveState {
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: !translucent,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(if translucent {
                    wgpu::BlendState::ALPHA_BLENDING
                } else {
                    wgpu::BlendState::REPLACE
                }),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

fn depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("depth"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

/// Unit cube centred on the origin with flat per-face normals.
fn unit_cube() -> ObjMesh {
    let mut vertices = Vec::with_capacity(24 * 6);
    let mut indices = Vec::with_capacity(36);
    for normal in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
        let u = normal.any_orthonormal_vector();
        let v = normal.cross(u);
        let base = (vertices.len() / 6) as u32;
        for (du, dv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let corner = (normal + u * du + v * dv) * 0.5;
            vertices.extend_from_slice(&corner.to_array());
            vertices.extend_from_slice(&normal.to_array());
        }
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    ObjMesh { vertices, indices }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FrameUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    light_position: [f32; 4],
    light_color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectUniform {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    color: [f32; 4],
}

const SHADER: &str = r#"
struct Frame {
    view_proj: mat4x4<f32>,
    eye: vec4<f32>,
    light: vec4<f32>,
    // rgb colour, intensity in w
    light_color: vec4<f32>,
}

struct Object {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> frame: Frame;
@group(1) @binding(0) var<uniform> object: Object;

struct Varyings {
    @builtin(position) clip: vec4<f32>,
    @location(0) world: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> Varyings {
    let world = object.model * vec4<f32>(position, 1.0);
    let to_world = mat3x3<f32>(object.normal[0].xyz, object.normal[1].xyz, object.normal[2].xyz);
    return Varyings(frame.view_proj * world, world.xyz, to_world * normal);
}

// Both faces are lit: exported anatomy meshes mix winding orders.
@fragment
fn fs_main(v: Varyings) -> @location(0) vec4<f32> {
    let n = normalize(v.normal);
    let facing = abs(dot(n, normalize(frame.light.xyz - v.world)));
    let rim = pow(1.0 - abs(dot(n, normalize(frame.eye.xyz - v.world))), 3.0) * 0.2;
    let shade = 0.35 + facing * frame.light_color.w * 0.65 + rim;
    return vec4<f32>(shade * object.color.rgb * frame.light_color.rgb, object.color.a);
}
"#;
