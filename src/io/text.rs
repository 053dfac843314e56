use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use crate::error::Error;
use crate::geometry::SymTensor;
use crate::geometry::Tensor;
use crate::geometry::TracelessTensor;
use crate::geometry::Vector;
use crate::prelude::Float;
use crate::storage::BufferRef;
use crate::storage::Holder;
use crate::storage::OrderEnum;
use crate::storage::Quantity;
use crate::storage::QuantityId;
use crate::storage::Storage;
use crate::storage::ValueId;

const LEVEL_SUFFIXES: [&str; 3] = ["", "_dt", "_d2t"];

fn component_suffixes(value_id: ValueId) -> &'static [&'static str] {
    match value_id {
        ValueId::Scalar | ValueId::Index => &[""],
        ValueId::Vector => &["_x", "_y", "_z", "_h"],
        ValueId::Tensor => &[
            "_xx", "_xy", "_xz", "_yx", "_yy", "_yz", "_zx", "_zy", "_zz",
        ],
        ValueId::SymTensor => &["_xx", "_yy", "_zz", "_xy", "_xz", "_yz"],
        ValueId::TracelessTensor => &["_xx", "_yy", "_xy", "_xz", "_yz"],
    }
}

fn column_names(id: QuantityId, value_id: ValueId, level: usize) -> Vec<String> {
    component_suffixes(value_id)
        .iter()
        .map(|suffix| format!("{}{}{}", id.name(), LEVEL_SUFFIXES[level], suffix))
        .collect()
}

fn components(buffer: &BufferRef, particle: usize) -> Vec<Float> {
    match buffer {
        BufferRef::Scalar(values) => vec![values[particle]],
        BufferRef::Index(values) => vec![values[particle] as Float],
        BufferRef::Vector(values) => {
            let v = values[particle];
            vec![v.x(), v.y(), v.z(), v.h()]
        }
        BufferRef::Tensor(values) => {
            let t = values[particle];
            (0..3)
                .flat_map(|i| (0..3).map(move |j| t.component(i, j)))
                .collect()
        }
        BufferRef::SymTensor(values) => {
            let t = values[particle];
            let diag = t.diagonal();
            let off = t.off_diagonal();
            vec![diag.x(), diag.y(), diag.z(), off.x(), off.y(), off.z()]
        }
        BufferRef::TracelessTensor(values) => {
            let t = values[particle];
            let diag = t.diagonal();
            let off = t.off_diagonal();
            vec![diag.x(), diag.y(), off.x(), off.y(), off.z()]
        }
    }
}

/// Human-readable whitespace-delimited snapshot: a header row naming
/// every column, then one row per particle. For debugging and small
/// fixtures; round-trips doubles to about six significant digits of
/// relative error.
pub struct TextOutput;

impl TextOutput {
    pub fn save(path: &Path, storage: &Storage) -> Result<(), Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let mut header = Vec::new();
        for (id, quantity) in storage.quantities() {
            for level in 0..=quantity.order().as_u8() as usize {
                header.extend(column_names(id, quantity.value_id(), level));
            }
        }
        writeln!(writer, "{}", header.join(" "))?;
        for particle in 0..storage.particle_count() {
            let mut row = Vec::new();
            for (_, quantity) in storage.quantities() {
                for level in 0..=quantity.order().as_u8() as usize {
                    let buffer = quantity.buffer(level).expect("order admits this level");
                    for component in components(&buffer, particle) {
                        row.push(format!("{:.10e}", component));
                    }
                }
            }
            writeln!(writer, "{}", row.join(" "))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Description of one column group recovered from the header.
struct ColumnGroup {
    id: QuantityId,
    value_id: ValueId,
    level: usize,
    width: usize,
}

/// The value type every quantity id is stored with; the header names
/// alone cannot distinguish a scalar from an index column.
fn canonical_value_id(id: QuantityId) -> ValueId {
    match id {
        QuantityId::Position | QuantityId::VelocityRotation => ValueId::Vector,
        QuantityId::DeviatoricStress => ValueId::TracelessTensor,
        QuantityId::VelocityGradient => ValueId::Tensor,
        QuantityId::NFlaws | QuantityId::MaterialIdx => ValueId::Index,
        _ => ValueId::Scalar,
    }
}

fn parse_header(tokens: &[&str]) -> Result<Vec<ColumnGroup>, Error> {
    let all_ids: Vec<QuantityId> = (0..64).filter_map(QuantityId::from_u16).collect();
    let mut groups = Vec::new();
    let mut position = 0;
    'outer: while position < tokens.len() {
        for &id in &all_ids {
            let value_id = canonical_value_id(id);
            for level in 0..3 {
                let names = column_names(id, value_id, level);
                if tokens.len() - position >= names.len()
                    && names
                        .iter()
                        .zip(&tokens[position..])
                        .all(|(name, token)| name == token)
                {
                    position += names.len();
                    groups.push(ColumnGroup {
                        id,
                        value_id,
                        level,
                        width: names.len(),
                    });
                    continue 'outer;
                }
            }
        }
        return Err(Error::Corrupted(format!(
            "unrecognized column \"{}\"",
            tokens[position]
        )));
    }
    Ok(groups)
}

pub struct TextInput;

impl TextInput {
    pub fn load(path: &Path) -> Result<Storage, Error> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let header = lines
            .next()
            .ok_or_else(|| Error::Corrupted("empty text snapshot".to_owned()))??;
        let tokens: Vec<&str> = header.split_whitespace().collect();
        let groups = parse_header(&tokens)?;
        let width: usize = groups.iter().map(|group| group.width).sum();

        let mut rows: Vec<Vec<Float>> = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row: Result<Vec<Float>, _> = line
                .split_whitespace()
                .map(|token| token.parse::<Float>())
                .collect();
            let row =
                row.map_err(|_| Error::Corrupted("malformed number in snapshot".to_owned()))?;
            if row.len() != width {
                return Err(Error::Corrupted(format!(
                    "row has {} columns, header has {}",
                    row.len(),
                    width
                )));
            }
            rows.push(row);
        }

        let mut storage = Storage::new();
        let mut offset = 0;
        // column groups of the same quantity are contiguous: collect the
        // buffers of each quantity, then insert
        let mut index = 0;
        while index < groups.len() {
            let id = groups[index].id;
            let value_id = groups[index].value_id;
            let mut levels = Vec::new();
            while index < groups.len() && groups[index].id == id {
                levels.push((groups[index].level, offset));
                offset += groups[index].width;
                index += 1;
            }
            let order = OrderEnum::from_u8((levels.len() - 1) as u8).unwrap();
            let quantity = build_quantity(value_id, order, &levels, &rows)?;
            storage.insert_quantity(id, quantity);
        }
        Ok(storage)
    }
}

fn build_quantity(
    value_id: ValueId,
    order: OrderEnum,
    levels: &[(usize, usize)],
    rows: &[Vec<Float>],
) -> Result<Quantity, Error> {
    fn collect<T>(
        rows: &[Vec<Float>],
        offset: usize,
        assemble: impl Fn(&[Float]) -> T,
        width: usize,
    ) -> Vec<T> {
        rows.iter()
            .map(|row| assemble(&row[offset..offset + width]))
            .collect()
    }

    macro_rules! build {
        ($type:ty, $width:expr, $assemble:expr) => {{
            let mut holder: Option<Holder<$type>> = None;
            for &(level, offset) in levels {
                let values = collect(rows, offset, $assemble, $width);
                if level == 0 {
                    holder = Some(Holder::from_values(order, values));
                } else if let Some(holder) = &mut holder {
                    holder.set_derivative_buffer(level, values);
                } else {
                    return Err(Error::Corrupted(
                        "derivative columns precede the value columns".to_owned(),
                    ));
                }
            }
            Quantity::new(holder.ok_or_else(|| {
                Error::Corrupted("quantity has no value columns".to_owned())
            })?)
        }};
    }

    Ok(match value_id {
        ValueId::Scalar => build!(Float, 1, |c: &[Float]| c[0]),
        ValueId::Index => build!(u32, 1, |c: &[Float]| c[0] as u32),
        ValueId::Vector => build!(Vector, 4, |c: &[Float]| Vector::with_h(
            c[0], c[1], c[2], c[3]
        )),
        ValueId::Tensor => build!(Tensor, 9, |c: &[Float]| Tensor::new([
            Vector::new(c[0], c[1], c[2]),
            Vector::new(c[3], c[4], c[5]),
            Vector::new(c[6], c[7], c[8]),
        ])),
        ValueId::SymTensor => build!(SymTensor, 6, |c: &[Float]| SymTensor::new(
            Vector::new(c[0], c[1], c[2]),
            Vector::new(c[3], c[4], c[5]),
        )),
        ValueId::TracelessTensor => build!(TracelessTensor, 5, |c: &[Float]| {
            TracelessTensor::new(c[0], c[1], c[2], c[3], c[4])
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::gas_lattice_storage;

    #[test]
    fn text_round_trip_within_tolerance() {
        let mut storage = gas_lattice_storage(2, 1.0);
        for (i, rho) in storage
            .values_mut::<Float>(QuantityId::Density)
            .iter_mut()
            .enumerate()
        {
            *rho = 1000.0 * (1.0 + 0.001 * (i as Float).sin());
        }
        storage
            .insert(
                QuantityId::DeviatoricStress,
                OrderEnum::First,
                TracelessTensor::new(1.0e5, -3.0e4, 0.5, 0.25, -0.125),
            )
            .unwrap();
        let dir = std::env::temp_dir().join("rubble_text_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("snapshot.txt");
        TextOutput::save(&path, &storage).unwrap();
        let loaded = TextInput::load(&path).unwrap();
        assert_eq!(loaded.particle_count(), storage.particle_count());
        let original = storage.values::<Float>(QuantityId::Density);
        let restored = loaded.values::<Float>(QuantityId::Density);
        for i in 0..original.len() {
            assert!(
                (original[i] - restored[i]).abs() <= 1.0e-6 * original[i].abs(),
                "particle {}",
                i
            );
        }
        // orders and types survive
        let position = loaded.quantity(QuantityId::Position).unwrap();
        assert_eq!(position.order(), OrderEnum::Second);
        assert_eq!(position.value_id(), ValueId::Vector);
        let stress = loaded.quantity(QuantityId::DeviatoricStress).unwrap();
        assert_eq!(stress.value_id(), ValueId::TracelessTensor);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn header_of_unknown_columns_is_rejected(){
        let dir = std::env::temp_dir().join("rubble_text_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.txt");
        std::fs::write(&path, "flux_capacitor\n1.0\n").unwrap();
        assert!(TextInput::load(&path).is_err());
        std::fs::remove_file(path).unwrap();
    }
}
