use crate::error::SetupError;

/// Picks a surface format whose pixels take `bits` bits.
///
/// 32-bit buffers prefer an sRGB format.
pub(crate) fn choose_surface_format(
    formats: &[wgpu::TextureFormat],
    bits: u32,
) -> Result<wgpu::TextureFormat, SetupError> {
    let matching: Vec<wgpu::TextureFormat> = formats
        .iter()
        .copied()
        .filter(|f| f.block_copy_size(None).map(|bytes| bytes * 8) == Some(bits))
        .collect();

    if bits == 32 {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if matching.contains(&f) {
                return Ok(f);
            }
        }
    }

    matching
        .first()
        .copied()
        .ok_or(SetupError::NoSurfaceFormat(bits))
}

/// An opaque surface needs an opaque alpha mode; otherwise the first supported mode that
/// blends is preferred.
pub(crate) fn choose_alpha_mode(
    supported: &[wgpu::CompositeAlphaMode],
    opaque: bool,
) -> wgpu::CompositeAlphaMode {
    let wanted: &[wgpu::CompositeAlphaMode] = if opaque {
        &[wgpu::CompositeAlphaMode::Opaque]
    } else {
        &[
            wgpu::CompositeAlphaMode::PreMultiplied,
            wgpu::CompositeAlphaMode::PostMultiplied,
        ]
    };

    wanted
        .iter()
        .copied()
        .find(|m| supported.contains(m))
        .or_else(|| supported.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

pub(crate) fn choose_present_mode(vsync: bool) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::Fifo
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}
