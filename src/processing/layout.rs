/// Size after scaling `src` uniformly so its width equals `target_w`.
///
/// The height is truncated, never rounded.
pub fn scale_to_width(src_w: u32, src_h: u32, target_w: u32) -> (u32, u32) {
    let src_w = u64::from(src_w.max(1));
    let h = u64::from(src_h) * u64::from(target_w) / src_w;
    (target_w, u32::try_from(h).unwrap_or(u32::MAX))
}

/// First row of a vertical center crop, or `None` when the image is too short.
pub fn center_crop_top(scaled_h: u32, target_h: u32) -> Option<u32> {
    scaled_h.checked_sub(target_h).map(|excess| excess / 2)
}
