//! Compiled GL programs with cached locations and deferred uniforms.
//!
//! Setting a uniform never touches GL. Values queue up on the [`Shader`]
//! and are flushed by [`Shader::use_program`] right before a draw. Scalar,
//! vector and matrix values are one-shot and leave the queue once applied.
//! Texture bindings are sticky: each sampler name keeps the texture unit it
//! was first given and is re-bound on every use.

use super::{
    error::{check_gl_error, GpuError},
    texture::Texture,
};
use crate::assets::{load_text, AssetSource};
use glam::Mat4;
use glow::HasContext;
use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

/// Blend factors accepted by `glBlendFuncSeparate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
}

impl BlendFactor {
    fn gl(self) -> u32 {
        match self {
            BlendFactor::Zero => glow::ZERO,
            BlendFactor::One => glow::ONE,
            BlendFactor::SrcColor => glow::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
            BlendFactor::DstColor => glow::DST_COLOR,
            BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
            BlendFactor::SrcAlpha => glow::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => glow::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
            BlendFactor::ConstantColor => glow::CONSTANT_COLOR,
            BlendFactor::OneMinusConstantColor => glow::ONE_MINUS_CONSTANT_COLOR,
            BlendFactor::ConstantAlpha => glow::CONSTANT_ALPHA,
            BlendFactor::OneMinusConstantAlpha => glow::ONE_MINUS_CONSTANT_ALPHA,
        }
    }
}

/// Fixed-function state applied whenever the program is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull_face: bool,
    pub src_rgb: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            cull_face: true,
            src_rgb: BlendFactor::One,
            dst_rgb: BlendFactor::Zero,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
        }
    }
}

/// A one-shot uniform value. Array forms hold several elements back to back.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Vec2(Vec<f32>),
    Vec3(Vec<f32>),
    Vec4(Vec<f32>),
    Mat2(Vec<f32>),
    Mat3(Vec<f32>),
    Mat4(Vec<f32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSlot<T> {
    pub unit: u32,
    pub texture: T,
}

/// One entry handed to the flush callback.
#[derive(Debug, PartialEq)]
pub enum Uniform<'a, T> {
    Texture { unit: u32, texture: &'a T },
    Value(&'a UniformValue),
}

/// Sticky texture bindings plus transient values, keyed by uniform name.
#[derive(Debug)]
pub struct UniformQueue<T> {
    textures: BTreeMap<String, TextureSlot<T>>,
    pending: BTreeMap<String, UniformValue>,
}

impl<T> Default for UniformQueue<T> {
    fn default() -> Self {
        Self {
            textures: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }
}

impl<T> UniformQueue<T> {
    /// Queues a one-shot value, replacing any earlier one for `name`.
    pub fn set_value(&mut self, name: &str, value: UniformValue) {
        self.pending.insert(name.to_string(), value);
    }

    /// Binds `texture` to `name`, returning the unit it occupies. A name keeps
    /// its first unit for the lifetime of the queue.
    pub fn set_texture(&mut self, name: &str, texture: T) -> u32 {
        if let Some(slot) = self.textures.get_mut(name) {
            slot.texture = texture;
            return slot.unit;
        }
        let unit = self.textures.len() as u32;
        self.textures
            .insert(name.to_string(), TextureSlot { unit, texture });
        unit
    }

    pub fn texture_unit(&self, name: &str) -> Option<u32> {
        self.textures.get(name).map(|slot| slot.unit)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Applies every texture binding, then every pending value. Pending
    /// values are removed whether or not applying them succeeds.
    pub fn flush<E>(
        &mut self,
        mut apply: impl FnMut(&str, Uniform<'_, T>) -> Result<(), E>,
    ) -> Result<(), E> {
        for (name, slot) in &self.textures {
            apply(
                name,
                Uniform::Texture {
                    unit: slot.unit,
                    texture: &slot.texture,
                },
            )?;
        }
        let pending = std::mem::take(&mut self.pending);
        for (name, value) in &pending {
            apply(name, Uniform::Value(value))?;
        }
        Ok(())
    }
}

/// Inserts `#define KEY VALUE` lines after every `#version` directive, or
/// at the top when there is none.
pub fn insert_defines(source: &str, defines: &BTreeMap<String, String>) -> String {
    if defines.is_empty() {
        return source.to_string();
    }
    let block: String = defines
        .iter()
        .map(|(key, value)| format!("#define {key} {value}\n"))
        .collect();

    let mut out = String::with_capacity(source.len() + block.len());
    let mut injected = false;
    for line in source.split_inclusive('\n') {
        out.push_str(line);
        if is_version_directive(line) {
            if !line.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block);
            injected = true;
        }
    }

    if injected {
        out
    } else {
        block + source
    }
}

fn is_version_directive(line: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix('#') else {
        return false;
    };
    rest.trim_start()
        .strip_prefix("version")
        .is_some_and(|tail| tail.starts_with(char::is_whitespace))
}

/// A texture as the program binds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundTexture {
    target: u32,
    raw: glow::Texture,
}

/// A linked program with cached locations, draw state and queued uniforms.
pub struct Shader {
    gl: Arc<glow::Context>,
    program: Option<glow::Program>,
    uniform_locations: HashMap<String, Option<glow::UniformLocation>>,
    attribute_locations: HashMap<String, Option<u32>>,
    uniforms: UniformQueue<BoundTexture>,
    state: DrawState,
}

impl Shader {
    pub fn new(
        gl: Arc<glow::Context>,
        vertex_source: &str,
        fragment_source: &str,
        defines: &BTreeMap<String, String>,
    ) -> Result<Self, GpuError> {
        let program = unsafe { link_program(&gl, vertex_source, fragment_source, defines)? };
        Ok(Self {
            gl,
            program: Some(program),
            uniform_locations: HashMap::new(),
            attribute_locations: HashMap::new(),
            uniforms: UniformQueue::default(),
            state: DrawState::default(),
        })
    }

    /// Loads `<vertex_name>` and `<fragment_name>` from `assets`.
    pub fn from_assets(
        gl: Arc<glow::Context>,
        assets: &dyn AssetSource,
        vertex_name: &str,
        fragment_name: &str,
        defines: &BTreeMap<String, String>,
    ) -> Result<Self, GpuError> {
        let vertex = load_text(assets, vertex_name)?;
        let fragment = load_text(assets, fragment_name)?;
        Self::new(gl, &vertex, &fragment, defines)
    }

    pub fn draw_state(&self) -> DrawState {
        self.state
    }

    /// Enables depth testing for draws with this shader.
    pub fn set_depth_test(&mut self, enabled: bool) -> &mut Self {
        self.state.depth_test = enabled;
        self
    }

    /// Enables depth writes for draws with this shader.
    pub fn set_depth_write(&mut self, enabled: bool) -> &mut Self {
        self.state.depth_write = enabled;
        self
    }

    pub fn set_cull_face(&mut self, enabled: bool) -> &mut Self {
        self.state.cull_face = enabled;
        self
    }

    /// Uses the same blend factors for color and alpha.
    pub fn set_blend(&mut self, src: BlendFactor, dst: BlendFactor) -> &mut Self {
        self.set_blend_separate(src, dst, src, dst)
    }

    pub fn set_blend_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> &mut Self {
        self.state.src_rgb = src_rgb;
        self.state.dst_rgb = dst_rgb;
        self.state.src_alpha = src_alpha;
        self.state.dst_alpha = dst_alpha;
        self
    }

    /// Binds `texture` to the sampler `name`. The sampler keeps its unit.
    pub fn set_texture(&mut self, name: &str, texture: &Texture) -> Result<&mut Self, GpuError> {
        let bound = BoundTexture {
            target: texture.target().gl(),
            raw: texture.raw()?,
        };
        self.uniforms.set_texture(name, bound);
        Ok(self)
    }

    pub fn set_bool(&mut self, name: &str, v: bool) -> &mut Self {
        self.set_value(name, UniformValue::Int(vec![v as i32]))
    }

    pub fn set_int(&mut self, name: &str, v: i32) -> &mut Self {
        self.set_value(name, UniformValue::Int(vec![v]))
    }

    pub fn set_int_array(&mut self, name: &str, v: &[i32]) -> &mut Self {
        self.set_value(name, UniformValue::Int(v.to_vec()))
    }

    pub fn set_float(&mut self, name: &str, v: f32) -> &mut Self {
        self.set_value(name, UniformValue::Float(vec![v]))
    }

    pub fn set_float_array(&mut self, name: &str, v: &[f32]) -> &mut Self {
        self.set_value(name, UniformValue::Float(v.to_vec()))
    }

    pub fn set_vec2(&mut self, name: &str, v: [f32; 2]) -> &mut Self {
        self.set_value(name, UniformValue::Vec2(v.to_vec()))
    }

    pub fn set_vec3(&mut self, name: &str, v: [f32; 3]) -> &mut Self {
        self.set_value(name, UniformValue::Vec3(v.to_vec()))
    }

    pub fn set_vec3_array(&mut self, name: &str, v: &[[f32; 3]]) -> &mut Self {
        self.set_value(name, UniformValue::Vec3(v.concat()))
    }

    pub fn set_vec4(&mut self, name: &str, v: [f32; 4]) -> &mut Self {
        self.set_value(name, UniformValue::Vec4(v.to_vec()))
    }

    pub fn set_vec4_array(&mut self, name: &str, v: &[[f32; 4]]) -> &mut Self {
        self.set_value(name, UniformValue::Vec4(v.concat()))
    }

    /// Column-major 2x2.
    pub fn set_mat2(&mut self, name: &str, v: [f32; 4]) -> &mut Self {
        self.set_value(name, UniformValue::Mat2(v.to_vec()))
    }

    /// Column-major 3x3.
    pub fn set_mat3(&mut self, name: &str, v: [f32; 9]) -> &mut Self {
        self.set_value(name, UniformValue::Mat3(v.to_vec()))
    }

    /// Queues a column-major matrix.
    pub fn set_mat4(&mut self, name: &str, m: &Mat4) -> &mut Self {
        self.set_value(name, UniformValue::Mat4(m.to_cols_array().to_vec()))
    }

    pub fn set_mat4_array(&mut self, name: &str, ms: &[Mat4]) -> &mut Self {
        let flat = ms.iter().flat_map(|m| m.to_cols_array()).collect();
        self.set_value(name, UniformValue::Mat4(flat))
    }

    fn set_value(&mut self, name: &str, value: UniformValue) -> &mut Self {
        self.uniforms.set_value(name, value);
        self
    }

    /// Cached uniform location; `None` when the program has no such uniform.
    pub fn uniform_location(&mut self, name: &str) -> Option<glow::UniformLocation> {
        let program = self.program?;
        resolve_uniform(&self.gl, program, &mut self.uniform_locations, name)
    }

    /// Cached attribute location; `None` when the program has no such attribute.
    pub fn attribute_location(&mut self, name: &str) -> Option<u32> {
        let program = self.program?;
        if let Some(cached) = self.attribute_locations.get(name) {
            return *cached;
        }
        let location = unsafe { self.gl.get_attrib_location(program, name) };
        if location.is_none() {
            log::warn!("Attribute `{name}` not found in program");
        }
        self.attribute_locations.insert(name.to_string(), location);
        location
    }

    /// Binds the program, applies draw state and flushes queued uniforms.
    pub fn use_program(&mut self) -> Result<(), GpuError> {
        let program = self.program.ok_or(GpuError::Freed("Shader"))?;
        let Self {
            gl,
            uniform_locations,
            uniforms,
            state,
            ..
        } = self;
        let gl: &glow::Context = &**gl;

        unsafe {
            gl.use_program(Some(program));
            check_gl_error(gl, "Failed to use shader program", "glUseProgram")?;
            gl.enable(glow::BLEND);
            gl.blend_func_separate(
                state.src_rgb.gl(),
                state.dst_rgb.gl(),
                state.src_alpha.gl(),
                state.dst_alpha.gl(),
            );
            gl.depth_mask(state.depth_write);
            set_capability(gl, glow::DEPTH_TEST, state.depth_test);
            set_capability(gl, glow::CULL_FACE, state.cull_face);
            check_gl_error(gl, "Failed to apply draw state", "glEnable/glDisable")?;
        }

        uniforms.flush(|name, uniform| {
            let Some(location) = resolve_uniform(gl, program, uniform_locations, name) else {
                return Ok(());
            };
            let applied = unsafe {
                apply_uniform(gl, &location, uniform);
                check_gl_error(gl, "Failed to set shader uniform", "glUniform")
            };
            applied.map_err(|source| GpuError::Uniform {
                name: name.to_string(),
                source: Box::new(source),
            })
        })?;

        unsafe {
            gl.active_texture(glow::TEXTURE0);
            check_gl_error(gl, "Failed to set active texture", "glActiveTexture")
        }
    }

    /// Deletes the program. Bound textures stay with their owners.
    pub fn close(&mut self) {
        if let Some(program) = self.program.take() {
            unsafe { self.gl.delete_program(program) };
        }
        self.uniform_locations.clear();
        self.attribute_locations.clear();
    }
}

fn resolve_uniform(
    gl: &glow::Context,
    program: glow::Program,
    cache: &mut HashMap<String, Option<glow::UniformLocation>>,
    name: &str,
) -> Option<glow::UniformLocation> {
    if let Some(cached) = cache.get(name) {
        return cached.clone();
    }
    let location = unsafe { gl.get_uniform_location(program, name) };
    if location.is_none() {
        log::warn!("Uniform `{name}` not found in program");
    }
    cache.insert(name.to_string(), location.clone());
    location
}

unsafe fn set_capability(gl: &glow::Context, cap: u32, enabled: bool) {
    if enabled {
        gl.enable(cap);
    } else {
        gl.disable(cap);
    }
}

unsafe fn apply_uniform(gl: &glow::Context, location: &glow::UniformLocation, uniform: Uniform<'_, BoundTexture>) {
    let loc = Some(location);
    match uniform {
        Uniform::Texture { unit, texture } => {
            gl.active_texture(glow::TEXTURE0 + unit);
            gl.bind_texture(texture.target, Some(texture.raw));
            gl.uniform_1_i32(loc, unit as i32);
        }
        Uniform::Value(value) => match value {
            UniformValue::Int(v) => gl.uniform_1_i32_slice(loc, v),
            UniformValue::Float(v) => gl.uniform_1_f32_slice(loc, v),
            UniformValue::Vec2(v) => gl.uniform_2_f32_slice(loc, v),
            UniformValue::Vec3(v) => gl.uniform_3_f32_slice(loc, v),
            UniformValue::Vec4(v) => gl.uniform_4_f32_slice(loc, v),
            UniformValue::Mat2(v) => gl.uniform_matrix_2_f32_slice(loc, false, v),
            UniformValue::Mat3(v) => gl.uniform_matrix_3_f32_slice(loc, false, v),
            UniformValue::Mat4(v) => gl.uniform_matrix_4_f32_slice(loc, false, v),
        },
    }
}

unsafe fn compile_stage(gl: &glow::Context, stage: u32, source: &str) -> Result<glow::Shader, GpuError> {
    let shader = gl
        .create_shader(stage)
        .map_err(|message| GpuError::Create { what: "shader", message })?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let info = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(GpuError::Compile(info));
    }
    Ok(shader)
}

unsafe fn link_program(
    gl: &glow::Context,
    vertex_source: &str,
    fragment_source: &str,
    defines: &BTreeMap<String, String>,
) -> Result<glow::Program, GpuError> {
    let vertex = compile_stage(gl, glow::VERTEX_SHADER, &insert_defines(vertex_source, defines))?;
    let fragment = match compile_stage(gl, glow::FRAGMENT_SHADER, &insert_defines(fragment_source, defines)) {
        Ok(fragment) => fragment,
        Err(e) => {
            gl.delete_shader(vertex);
            return Err(e);
        }
    };

    let program = match gl.create_program() {
        Ok(program) => program,
        Err(message) => {
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);
            return Err(GpuError::Create { what: "program", message });
        }
    };
    gl.attach_shader(program, vertex);
    gl.attach_shader(program, fragment);
    gl.link_program(program);

    // Stages are no longer needed once linked, successful or not.
    gl.detach_shader(program, vertex);
    gl.detach_shader(program, fragment);
    gl.delete_shader(vertex);
    gl.delete_shader(fragment);

    if !gl.get_program_link_status(program) {
        let info = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(GpuError::Link(info));
    }
    Ok(program)
}
