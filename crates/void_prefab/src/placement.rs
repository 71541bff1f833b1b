//! Container placement for new prefabs

use crate::entity::{Transform, IDENTITY_ROTATION};

/// Translation and rotation for a container wrapping `transforms`
///
/// One entity: the container takes its placement. Several: the average
/// translation with Z dropped to the lowest input Z, and no rotation, so the
/// container sits on the "floor" of the selection.
pub fn container_transform(transforms: &[Transform]) -> ([f32; 3], [f32; 4]) {
    match transforms {
        [] => ([0.0; 3], IDENTITY_ROTATION),
        [single] => (single.translation, single.rotation),
        many => {
            let mut sum = [0.0f32; 3];
            let mut min_z = f32::INFINITY;
            for transform in many {
                for (axis, value) in sum.iter_mut().zip(transform.translation) {
                    *axis += value;
                }
                min_z = min_z.min(transform.translation[2]);
            }
            let count = many.len() as f32;
            ([sum[0] / count, sum[1] / count, min_z], IDENTITY_ROTATION)
        }
    }
}

/// Translation of `child` relative to a container at `container`, ignoring rotation
pub fn offset_from(container: [f32; 3], child: [f32; 3]) -> [f32; 3] {
    [child[0] - container[0], child[1] - container[1], child[2] - container[2]]
}
