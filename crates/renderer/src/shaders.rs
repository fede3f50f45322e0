use crate::effects::Effect;

/// Builds the complete fragment program for `effect`.
///
/// The result is [`PRELUDE`] followed by the effect's `main`. The function is
/// pure: the same effect always yields byte-identical source.
pub fn fragment_shader(effect: Effect) -> String {
    let body = match effect {
        Effect::Normal | Effect::RedRemove => IDENTITY_BODY,
        Effect::Mirror => MIRROR_BODY,
        Effect::VMirror => VMIRROR_BODY,
        Effect::Convex => CONVEX_BODY,
        Effect::Concave => CONCAVE_BODY,
        Effect::Wave => WAVE_BODY,
        Effect::Swirl => SWIRL_BODY,
        Effect::Fisheye => FISHEYE_BODY,
        Effect::Kaleidoscope => KALEIDOSCOPE_BODY,
        Effect::RgbShift => RGB_SHIFT_BODY,
        Effect::Pixelate => PIXELATE_BODY,
        Effect::OilPainting => OIL_PAINTING_BODY,
        Effect::Neon => NEON_BODY,
        Effect::Rainbow => RAINBOW_BODY,
    };
    format!("{PRELUDE}\n{body}")
}

/// Fragment program for a textual effect id. Unknown ids get the identity
/// pass-through so an unexpected id never fails to render.
pub fn fragment_shader_for_id(id: &str) -> String {
    fragment_shader(Effect::from_id(id).unwrap_or(Effect::Normal))
}

/// Vertex program shared by every effect. Consumes the interleaved quad
/// (`a_position` at location 0, `a_texCoord` at location 1).
pub const VERTEX_SHADER: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_texCoord;
layout(location = 0) out vec2 v_texCoord;

void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
    v_texCoord = a_texCoord;
}
";

/// Names of the uniforms every fragment program can read.
pub const UNIFORM_NAMES: [&str; 5] = [
    "u_texture",
    "u_time",
    "u_resolution",
    "u_textureResolution",
    "u_aspect",
];

/// Names of the vertex inputs resolved once per program.
pub const ATTRIBUTE_NAMES: [&str; 2] = ["a_position", "a_texCoord"];

/// Extracts `layout(location = N) in <type> <name>;` declarations from a
/// vertex program as `(name, location)` pairs.
pub(crate) fn vertex_inputs(source: &str) -> Vec<(String, u32)> {
    source
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("layout")?.trim_start();
            let rest = rest.strip_prefix('(')?;
            let (qualifier, declaration) = rest.split_once(')')?;
            let location = qualifier
                .split(',')
                .filter_map(|part| part.split_once('='))
                .find(|(key, _)| key.trim() == "location")
                .and_then(|(_, value)| value.trim().parse::<u32>().ok())?;
            let mut tokens = declaration.trim().trim_end_matches(';').split_whitespace();
            if tokens.next()? != "in" {
                return None;
            }
            let _ty = tokens.next()?;
            let name = tokens.next()?;
            Some((name.to_string(), location))
        })
        .collect()
}

/// GLSL prologue shared by every effect.
///
/// The uniform block layout must match `MirrorUniforms` in `gpu/uniforms.rs`.
/// Effect code uses the plain `u_*` names; the macros route them to the block
/// and to the frame texture/sampler pair.
const PRELUDE: &str = r"#version 450
layout(location = 0) in vec2 v_texCoord;
layout(location = 0) out vec4 fragColor;

layout(std140, set = 0, binding = 0) uniform MirrorParams {
    vec2 _u_resolution;
    vec2 _u_textureResolution;
    float _u_time;
    float _u_aspect;
    vec2 _padding0;
} params;

#define u_resolution params._u_resolution
#define u_textureResolution params._u_textureResolution
#define u_time params._u_time
#define u_aspect params._u_aspect

layout(set = 1, binding = 0) uniform texture2D mirror_frame_texture;
layout(set = 1, binding = 1) uniform sampler mirror_frame_sampler;

#define u_texture sampler2D(mirror_frame_texture, mirror_frame_sampler)

vec3 hsv2rgb(vec3 c) {
    vec3 p = abs(fract(c.xxx + vec3(1.0, 2.0 / 3.0, 1.0 / 3.0)) * 6.0 - vec3(3.0));
    return c.z * mix(vec3(1.0), clamp(p - vec3(1.0), vec3(0.0), vec3(1.0)), c.y);
}

float luminance(vec3 color) {
    return dot(color, vec3(0.299, 0.587, 0.114));
}

float random(vec2 st) {
    return fract(sin(dot(st, vec2(12.9898, 78.233))) * 43758.5453);
}
";

const IDENTITY_BODY: &str = r"void main() {
    fragColor = texture(u_texture, v_texCoord);
}
";

const MIRROR_BODY: &str = r"void main() {
    vec2 coord = v_texCoord;
    coord.x = coord.x > 0.5 ? 1.0 - coord.x : coord.x;
    fragColor = texture(u_texture, coord);
}
";

const VMIRROR_BODY: &str = r"void main() {
    vec2 coord = v_texCoord;
    coord.y = coord.y > 0.5 ? 1.0 - coord.y : coord.y;
    fragColor = texture(u_texture, coord);
}
";

// Squared distances avoid a sqrt: 0.36 = 0.6^2.
const CONVEX_BODY: &str = r"void main() {
    vec2 coord = v_texCoord - vec2(0.5);
    float dist2 = dot(coord, coord);
    float factor = 1.0 - smoothstep(0.0, 0.36, dist2) * 0.3;
    fragColor = texture(u_texture, coord * factor + vec2(0.5));
}
";

// 0.16 = 0.4^2. Samples that land outside the frame are opaque black.
const CONCAVE_BODY: &str = r"void main() {
    vec2 coord = v_texCoord - vec2(0.5);
    float dist2 = dot(coord, coord);
    float factor = 1.0 + smoothstep(0.0, 0.16, dist2) * 0.6;
    vec2 newCoord = coord * factor + vec2(0.5);

    if (any(lessThan(newCoord, vec2(0.0))) || any(greaterThan(newCoord, vec2(1.0)))) {
        fragColor = vec4(0.0, 0.0, 0.0, 1.0);
    } else {
        fragColor = texture(u_texture, newCoord);
    }
}
";

const WAVE_BODY: &str = r"void main() {
    vec2 coord = v_texCoord;
    float timeOffset = u_time * 3.0;

    coord.x += sin(coord.y * 15.0 + timeOffset) * 0.02;
    coord.y += cos(coord.x * 15.0 + timeOffset) * 0.02;

    fragColor = texture(u_texture, clamp(coord, vec2(0.0), vec2(1.0)));
}
";

const SWIRL_BODY: &str = r"void main() {
    vec2 coord = v_texCoord - vec2(0.5);
    float dist = length(coord);
    float angle = atan(coord.y, coord.x) + dist * 5.0 + u_time;

    vec2 newCoord = vec2(cos(angle), sin(angle)) * dist + vec2(0.5);
    fragColor = texture(u_texture, newCoord);
}
";

const FISHEYE_BODY: &str = r"void main() {
    vec2 coord = v_texCoord - vec2(0.5);
    float dist = length(coord);
    float factor = mix(1.0, 1.0 / (1.0 + dist), smoothstep(0.0, 0.5, dist));

    fragColor = texture(u_texture, coord * factor + vec2(0.5));
}
";

// 1.047197551 = PI / 3. Odd segments are mirrored.
const KALEIDOSCOPE_BODY: &str = r"void main() {
    vec2 coord = v_texCoord - vec2(0.5);
    float angle = atan(coord.y, coord.x);
    float radius = length(coord);

    const float segment = 1.047197551;
    angle = mod(angle, segment);
    if (mod(floor(atan(coord.y, coord.x) / segment), 2.0) == 1.0) {
        angle = segment - angle;
    }

    vec2 newCoord = vec2(cos(angle), sin(angle)) * radius + vec2(0.5);
    fragColor = texture(u_texture, newCoord);
}
";

const RGB_SHIFT_BODY: &str = r"void main() {
    float offset = 0.01 * sin(u_time * 2.0);
    vec2 coord = v_texCoord;

    float r = texture(u_texture, coord + vec2(offset, 0.0)).r;
    float g = texture(u_texture, coord).g;
    float b = texture(u_texture, coord - vec2(offset, 0.0)).b;

    fragColor = vec4(r, g, b, 1.0);
}
";

const PIXELATE_BODY: &str = r"void main() {
    float pixelSize = 20.0 + sin(u_time) * 10.0;
    vec2 coord = floor(v_texCoord * pixelSize) / vec2(pixelSize);

    vec3 color = texture(u_texture, coord).rgb;
    color = pow(color, vec3(1.2));

    float gray = luminance(color);
    color = mix(vec3(gray), color, vec3(1.5));

    fragColor = vec4(color, 1.0);
}
";

const OIL_PAINTING_BODY: &str = r"void main() {
    vec2 coord = v_texCoord;
    vec3 color = texture(u_texture, coord).rgb;

    color += texture(u_texture, coord + vec2(0.01, 0.0)).rgb;
    color += texture(u_texture, coord + vec2(0.0, 0.01)).rgb;
    color += texture(u_texture, coord + vec2(-0.01, 0.0)).rgb;
    color += texture(u_texture, coord + vec2(0.0, -0.01)).rgb;

    color *= 0.2;

    color = pow(color, vec3(0.8));
    float lum = luminance(color);
    color = mix(vec3(lum), color, vec3(1.8));

    fragColor = vec4(color, 1.0);
}
";

const NEON_BODY: &str = r"void main() {
    vec2 coord = v_texCoord;
    vec3 color = texture(u_texture, coord).rgb;

    vec2 texelSize = vec2(2.0) / u_resolution;

    vec3 edge = abs(color - texture(u_texture, coord + vec2(texelSize.x, 0.0)).rgb);
    edge += abs(color - texture(u_texture, coord + vec2(-texelSize.x, 0.0)).rgb);
    edge += abs(color - texture(u_texture, coord + vec2(0.0, texelSize.y)).rgb);
    edge += abs(color - texture(u_texture, coord + vec2(0.0, -texelSize.y)).rgb);

    float edgeStrength = length(edge) * 0.25;

    vec3 neonColor = hsv2rgb(vec3(u_time * 0.1 + edgeStrength, 1.0, 1.0));
    color = mix(color * 0.3, neonColor, vec3(edgeStrength * 3.0));

    fragColor = vec4(color, 1.0);
}
";

const RAINBOW_BODY: &str = r"void main() {
    vec2 coord = v_texCoord - vec2(0.5);
    float dist = length(coord);
    float angle = atan(coord.y, coord.x) + sin(dist * 10.0 + u_time * 2.0) * 0.5;

    coord = vec2(cos(angle), sin(angle)) * dist + vec2(0.5);
    vec3 color = texture(u_texture, coord).rgb;

    float hue = dist * 2.0 + u_time * 0.5;
    vec3 rainbow = hsv2rgb(vec3(hue, 0.8, 1.0));

    fragColor = vec4(mix(color, color * rainbow, vec3(0.4)), 1.0);
}
";
