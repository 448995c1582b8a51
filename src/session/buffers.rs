use crate::model::TensorShapeSet;

/// Element count of a fully resolved shape.
pub fn element_count(shape: &[i64]) -> usize {
    shape.iter().map(|&d| d.max(0) as usize).product()
}

/// One flat float buffer per input and output tensor, allocated once per
/// session and reused by every tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorBuffers {
    pub inputs: Vec<Vec<f32>>,
    pub outputs: Vec<Vec<f32>>,
}

impl TensorBuffers {
    pub fn allocate(shapes: &TensorShapeSet) -> Self {
        let inputs = shapes
            .inputs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let len = element_count(&spec.shape);
                tracing::info!("Allocated {} sized float-array for input {}", len, i);
                vec![0.0f32; len]
            })
            .collect();
        let outputs = shapes
            .outputs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let len = element_count(&spec.shape);
                tracing::info!("Allocated {} sized float-array for output {}", len, i);
                vec![0.0f32; len]
            })
            .collect();

        Self { inputs, outputs }
    }
}
