// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Serialize ray state records carried inside SendRays payloads.
// Author: Lukas Bower

//! Codec for [`RayState`] inner records.

use glam::{Affine3A, Vec3};

use swarm_model::{Ray, RayDiff, RayState, Rgb, SampleInfo, TreeletRef};

use crate::error::CodecError;
use crate::record::{RecordReader, RecordWriter};

fn put_vec3(w: &mut RecordWriter, base: u32, v: Vec3) {
    w.put_f32(base, v.x);
    w.put_f32(base + 1, v.y);
    w.put_f32(base + 2, v.z);
}

fn put_rgb(w: &mut RecordWriter, field: u32, c: Rgb) {
    w.put_record(field, |r| {
        r.put_f32(1, c.r);
        r.put_f32(2, c.g);
        r.put_f32(3, c.b);
    });
}

fn read_rgb(mut r: RecordReader<'_>) -> Result<Rgb, CodecError> {
    let mut c = Rgb::ZERO;
    while let Some(f) = r.next()? {
        match f.number() {
            1 => c.r = f.f32()?,
            2 => c.g = f.f32()?,
            3 => c.b = f.f32()?,
            _ => {}
        }
    }
    Ok(c)
}

fn put_treelet_ref(w: &mut RecordWriter, field: u32, r: &TreeletRef) {
    w.put_record(field, |t| {
        t.put_u32(1, r.treelet);
        t.put_u32(2, r.node);
        if let Some(xf) = r.transform {
            let cols = xf.to_cols_array();
            let mut bytes = Vec::with_capacity(cols.len() * 4);
            for c in cols {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
            t.put_bytes(3, &bytes);
        }
    });
}

fn read_treelet_ref(mut r: RecordReader<'_>) -> Result<TreeletRef, CodecError> {
    let mut out = TreeletRef::new(0, 0);
    while let Some(f) = r.next()? {
        match f.number() {
            1 => out.treelet = f.u32()?,
            2 => out.node = f.u32()?,
            3 => {
                let bytes = f.bytes()?;
                if bytes.len() != 48 {
                    return Err(CodecError::InvalidValue(3));
                }
                let mut cols = [0.0f32; 12];
                for (i, chunk) in bytes.chunks_exact(4).enumerate() {
                    cols[i] = f32::from_le_bytes(chunk.try_into().expect("4 bytes"));
                }
                out.transform = Some(Affine3A::from_cols_array(&cols));
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Encode one ray as an inner record for a `SendRays` payload.
#[must_use]
pub fn encode_ray(ray: &RayState) -> Vec<u8> {
    let mut w = RecordWriter::new();
    w.put_record(1, |s| {
        s.put_u64(1, ray.sample.id);
        s.put_u32(2, ray.sample.num);
        s.put_i32(3, ray.sample.pixel.x);
        s.put_i32(4, ray.sample.pixel.y);
        s.put_f32(5, ray.sample.p_film.x);
        s.put_f32(6, ray.sample.p_film.y);
        s.put_f32(7, ray.sample.weight);
    });
    w.put_record(2, |r| {
        put_vec3(r, 1, ray.ray.origin);
        put_vec3(r, 4, ray.ray.direction);
        r.put_f32(7, ray.ray.t_max);
        if let Some(d) = &ray.ray.differentials {
            r.put_record(8, |dr| {
                put_vec3(dr, 1, d.rx_origin);
                put_vec3(dr, 4, d.ry_origin);
                put_vec3(dr, 7, d.rx_direction);
                put_vec3(dr, 10, d.ry_direction);
            });
        }
    });
    for entry in &ray.to_visit {
        put_treelet_ref(&mut w, 3, entry);
    }
    if let Some(hit) = &ray.hit {
        put_treelet_ref(&mut w, 4, hit);
    }
    put_rgb(&mut w, 5, ray.beta);
    put_rgb(&mut w, 6, ray.ld);
    w.put_u32(7, ray.bounces);
    w.put_u32(8, ray.remaining_bounces);
    w.put_bool(9, ray.is_shadow_ray);
    w.into_bytes()
}

fn read_sample(mut r: RecordReader<'_>) -> Result<SampleInfo, CodecError> {
    let mut s = SampleInfo::default();
    while let Some(f) = r.next()? {
        match f.number() {
            1 => s.id = f.u64()?,
            2 => s.num = f.u32()?,
            3 => s.pixel.x = f.i32()?,
            4 => s.pixel.y = f.i32()?,
            5 => s.p_film.x = f.f32()?,
            6 => s.p_film.y = f.f32()?,
            7 => s.weight = f.f32()?,
            _ => {}
        }
    }
    Ok(s)
}

fn read_ray(mut r: RecordReader<'_>) -> Result<Ray, CodecError> {
    let mut ray = Ray::new(Vec3::ZERO, Vec3::ZERO);
    while let Some(f) = r.next()? {
        match f.number() {
            1 => ray.origin.x = f.f32()?,
            2 => ray.origin.y = f.f32()?,
            3 => ray.origin.z = f.f32()?,
            4 => ray.direction.x = f.f32()?,
            5 => ray.direction.y = f.f32()?,
            6 => ray.direction.z = f.f32()?,
            7 => ray.t_max = f.f32()?,
            8 => {
                let mut d = RayDiff {
                    rx_origin: Vec3::ZERO,
                    ry_origin: Vec3::ZERO,
                    rx_direction: Vec3::ZERO,
                    ry_direction: Vec3::ZERO,
                };
                let mut dr = f.record()?;
                while let Some(df) = dr.next()? {
                    let v = df.f32()?;
                    match df.number() {
                        1 => d.rx_origin.x = v,
                        2 => d.rx_origin.y = v,
                        3 => d.rx_origin.z = v,
                        4 => d.ry_origin.x = v,
                        5 => d.ry_origin.y = v,
                        6 => d.ry_origin.z = v,
                        7 => d.rx_direction.x = v,
                        8 => d.rx_direction.y = v,
                        9 => d.rx_direction.z = v,
                        10 => d.ry_direction.x = v,
                        11 => d.ry_direction.y = v,
                        12 => d.ry_direction.z = v,
                        _ => {}
                    }
                }
                ray.differentials = Some(d);
            }
            _ => {}
        }
    }
    Ok(ray)
}

/// Decode one inner record back into a ray.
pub fn decode_ray(record: &[u8]) -> Result<RayState, CodecError> {
    let mut out = RayState::default();
    let mut r = RecordReader::new(record);
    while let Some(f) = r.next()? {
        match f.number() {
            1 => out.sample = read_sample(f.record()?)?,
            2 => out.ray = read_ray(f.record()?)?,
            3 => out.to_visit.push(read_treelet_ref(f.record()?)?),
            4 => out.hit = Some(read_treelet_ref(f.record()?)?),
            5 => out.beta = read_rgb(f.record()?)?,
            6 => out.ld = read_rgb(f.record()?)?,
            7 => out.bounces = f.u32()?,
            8 => out.remaining_bounces = f.u32()?,
            9 => out.is_shadow_ray = f.bool()?,
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use glam::{IVec2, Vec2};

    use super::*;

    fn sample_ray() -> RayState {
        let mut ray = RayState {
            sample: SampleInfo {
                id: 77,
                num: 2,
                pixel: IVec2::new(5, -3),
                p_film: Vec2::new(5.5, -2.25),
                weight: 1.0,
            },
            ray: Ray::new(Vec3::new(0.0, 1.0, -2.0), Vec3::new(0.5, -0.5, 1.0)),
            beta: Rgb::new(0.25, 0.5, 0.75),
            ld: Rgb::new(1.0, 0.0, 2.0),
            bounces: 3,
            remaining_bounces: 2,
            is_shadow_ray: true,
            ..RayState::default()
        };
        ray.ray.t_max = 41.5;
        ray.to_visit.push(TreeletRef::new(0, 0));
        ray.to_visit.push(TreeletRef {
            treelet: 6,
            node: 11,
            transform: Some(Affine3A::from_translation(Vec3::new(1.0, 2.0, 3.0))),
        });
        ray.hit = Some(TreeletRef::new(4, 9));
        ray
    }

    #[test]
    fn ray_round_trip() {
        let ray = sample_ray();
        let decoded = decode_ray(&encode_ray(&ray)).unwrap();
        assert_eq!(decoded, ray);
    }

    #[test]
    fn stack_order_is_preserved() {
        let ray = sample_ray();
        let decoded = decode_ray(&encode_ray(&ray)).unwrap();
        assert_eq!(decoded.current_treelet(), ray.current_treelet());
        assert_eq!(decoded.to_visit.len(), 2);
        assert_eq!(decoded.to_visit[0].treelet, 0);
        assert_eq!(decoded.to_visit[1].treelet, 6);
    }

    #[test]
    fn infinite_t_max_survives() {
        let mut ray = sample_ray();
        ray.ray.t_max = f32::INFINITY;
        let decoded = decode_ray(&encode_ray(&ray)).unwrap();
        assert!(decoded.ray.t_max.is_infinite());
    }
}
