// Little-endian word conversions for on-disk images. Input that isn't a whole
// number of words is zero-padded.

use bytemuck::allocation::pod_collect_to_vec;
use bytemuck::cast_slice;

pub fn u16s_from_le_bytes(input: &[u8]) -> Vec<u16> {
    pod_collect_to_vec::<u8, u16>(input)
        .into_iter()
        .map(u16::from_le)
        .collect()
}

pub fn u32s_from_le_bytes(input: &[u8]) -> Vec<u32> {
    pod_collect_to_vec::<u8, u32>(input)
        .into_iter()
        .map(u32::from_le)
        .collect()
}

pub fn u16s_to_le_bytes(input: &[u16]) -> Vec<u8> {
    let words: Vec<u16> = input.iter().map(|w| w.to_le()).collect();
    cast_slice(&words).to_vec()
}

pub fn u32s_to_le_bytes(input: &[u32]) -> Vec<u8> {
    let words: Vec<u32> = input.iter().map(|w| w.to_le()).collect();
    cast_slice(&words).to_vec()
}
