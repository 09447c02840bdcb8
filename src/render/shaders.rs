pub(crate) const SCENE_SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_position: vec4<f32>,
    // rgb colour, w intensity
    light_color: vec4<f32>,
    // x cut-off distance, y decay, z 1.0 when a light exists
    light_params: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    // w: 0 phong, 1 standard
    base_color: vec4<f32>,
    // w: 1.0 when an environment map is bound
    emission: vec4<f32>,
    // w: shininess
    specular: vec4<f32>,
    // x roughness, y metalness, z reflectivity
    surface: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

@group(2) @binding(0)
var env_map: texture_2d<f32>;
@group(2) @binding(1)
var env_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

const PI: f32 = 3.141592653589793;

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;

    out.normal = normalize(world_normal);
    return out;
}

fn equirect_uv(dir: vec3<f32>) -> vec2<f32> {
    let u = atan2(dir.z, dir.x) * (0.5 / PI) + 0.5;
    let v = asin(clamp(dir.y, -1.0, 1.0)) / PI + 0.5;
    return vec2<f32>(u, 1.0 - v);
}

fn sample_environment(dir: vec3<f32>) -> vec3<f32> {
    return textureSampleLevel(env_map, env_sampler, equirect_uv(normalize(dir)), 0.0).rgb;
}

fn distance_falloff(distance: f32) -> f32 {
    let cutoff = globals.light_params.x;
    let decay = globals.light_params.y;
    var falloff = 1.0 / max(pow(distance, decay), 0.01);
    if (cutoff > 0.0) {
        let ratio = distance / cutoff;
        let window = clamp(1.0 - ratio * ratio * ratio * ratio, 0.0, 1.0);
        falloff = falloff * window * window;
    }
    return falloff;
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * denom * denom);
}

fn geometry_schlick_ggx(n_dot_x: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = r * r / 8.0;
    return n_dot_x / (n_dot_x * (1.0 - k) + k);
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (vec3<f32>(1.0) - f0) * pow(1.0 - cos_theta, 5.0);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(input.normal);
    let v = normalize(globals.camera_position.xyz - input.world_pos);
    let to_light = globals.light_position.xyz - input.world_pos;
    let light_distance = length(to_light);
    let l = to_light / max(light_distance, 0.0001);
    let h = normalize(l + v);
    let n_dot_l = max(dot(n, l), 0.0);
    let n_dot_v = max(dot(n, v), 0.0001);
    let n_dot_h = max(dot(n, h), 0.0);
    let radiance = globals.light_color.rgb * globals.light_color.w
        * distance_falloff(light_distance) * globals.light_params.z;
    let albedo = object.base_color.rgb;
    let has_env = object.emission.w > 0.5;
    let reflected = reflect(-v, n);

    var color = vec3<f32>(0.0);
    if (object.base_color.w < 0.5) {
        let shininess = object.specular.w;
        let diffuse = albedo / PI;
        let specular = object.specular.rgb * (0.25 / PI) * (shininess * 0.5 + 1.0) * pow(n_dot_h, shininess);
        color = (diffuse + specular) * radiance * n_dot_l;
        if (has_env) {
            color = mix(color, color * sample_environment(reflected), object.surface.z);
        }
    } else {
        let roughness = clamp(object.surface.x, 0.04, 1.0);
        let metalness = object.surface.y;
        let f0 = mix(vec3<f32>(0.04), albedo, metalness);
        let f = fresnel_schlick(max(dot(h, v), 0.0), f0);
        let d = distribution_ggx(n_dot_h, roughness);
        let g = geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
        let specular = d * g * f / max(4.0 * n_dot_v * n_dot_l, 0.0001);
        let k_d = (vec3<f32>(1.0) - f) * (1.0 - metalness);
        color = (k_d * albedo / PI + specular) * radiance * n_dot_l;
        if (has_env) {
            let irradiance = sample_environment(n);
            let f_env = fresnel_schlick(n_dot_v, f0);
            let reflection = sample_environment(reflected) * f_env * (1.0 - 0.5 * roughness);
            color = color + k_d * albedo * irradiance + reflection;
        }
    }
    color = color + object.emission.rgb;
    return vec4<f32>(color, 1.0);
}
"#;

/// Fullscreen triangle shared by the post-processing stages.
pub(crate) const FULLSCREEN_VERTEX: &str = r#"
struct FullscreenOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_fullscreen(@builtin(vertex_index) index: u32) -> FullscreenOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: FullscreenOutput;
    out.position = vec4<f32>(uv * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);
    out.uv = uv;
    return out;
}

@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
"#;

pub(crate) const EXTRACT_FRAGMENT: &str = r#"
// x threshold, y smooth width
struct ExtractParams {
    values: vec4<f32>,
}

@group(0) @binding(2) var<uniform> params: ExtractParams;

@fragment
fn fs_main(input: FullscreenOutput) -> @location(0) vec4<f32> {
    let texel = textureSampleLevel(source, source_sampler, input.uv, 0.0);
    let luma = dot(texel.rgb, vec3<f32>(0.299, 0.587, 0.114));
    let threshold = params.values.x;
    let alpha = smoothstep(threshold, threshold + params.values.y, luma);
    return mix(vec4<f32>(0.0), texel, alpha);
}
"#;

pub(crate) const BLUR_FRAGMENT: &str = r#"
struct BlurParams {
    // xy direction, zw texel size
    step: vec4<f32>,
    // x kernel radius, y sigma
    kernel: vec4<f32>,
}

@group(0) @binding(2) var<uniform> params: BlurParams;

fn gaussian_pdf(x: f32, sigma: f32) -> f32 {
    return 0.39894 * exp(-0.5 * x * x / (sigma * sigma)) / sigma;
}

@fragment
fn fs_main(input: FullscreenOutput) -> @location(0) vec4<f32> {
    let sigma = params.kernel.y;
    let radius = i32(params.kernel.x);
    var weight_sum = gaussian_pdf(0.0, sigma);
    var sum = textureSampleLevel(source, source_sampler, input.uv, 0.0).rgb * weight_sum;
    for (var i = 1; i < radius; i = i + 1) {
        let x = f32(i);
        let w = gaussian_pdf(x, sigma);
        let offset = params.step.xy * params.step.zw * x;
        let a = textureSampleLevel(source, source_sampler, input.uv + offset, 0.0).rgb;
        let b = textureSampleLevel(source, source_sampler, input.uv - offset, 0.0).rgb;
        sum = sum + (a + b) * w;
        weight_sum = weight_sum + 2.0 * w;
    }
    return vec4<f32>(sum / weight_sum, 1.0);
}
"#;

pub(crate) const COMPOSITE_FRAGMENT: &str = r#"
// per-mip weights, already multiplied by strength
struct CompositeParams {
    weights: vec4<f32>,
    last_weight: vec4<f32>,
}

@group(0) @binding(2) var<uniform> params: CompositeParams;

@group(1) @binding(0) var bloom_0: texture_2d<f32>;
@group(1) @binding(1) var bloom_1: texture_2d<f32>;
@group(1) @binding(2) var bloom_2: texture_2d<f32>;
@group(1) @binding(3) var bloom_3: texture_2d<f32>;
@group(1) @binding(4) var bloom_4: texture_2d<f32>;

@fragment
fn fs_main(input: FullscreenOutput) -> @location(0) vec4<f32> {
    let base = textureSampleLevel(source, source_sampler, input.uv, 0.0).rgb;
    let w = params.weights;
    let glow = w.x * textureSampleLevel(bloom_0, source_sampler, input.uv, 0.0).rgb
        + w.y * textureSampleLevel(bloom_1, source_sampler, input.uv, 0.0).rgb
        + w.z * textureSampleLevel(bloom_2, source_sampler, input.uv, 0.0).rgb
        + w.w * textureSampleLevel(bloom_3, source_sampler, input.uv, 0.0).rgb
        + params.last_weight.x * textureSampleLevel(bloom_4, source_sampler, input.uv, 0.0).rgb;
    return vec4<f32>(base + glow, 1.0);
}
"#;
