use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

use crate::error::Error;
use crate::geometry::Interval;
use crate::geometry::SymTensor;
use crate::geometry::Tensor;
use crate::geometry::TracelessTensor;
use crate::geometry::Vector;
use crate::io::RunTypeId;
use crate::io::SnapshotMeta;
use crate::materials::material_from_params;
use crate::prelude::Float;
use crate::settings::Settings;
use crate::settings::Value;
use crate::storage::BufferRef;
use crate::storage::Holder;
use crate::storage::OrderEnum;
use crate::storage::Quantity;
use crate::storage::QuantityId;
use crate::storage::Storage;
use crate::storage::ValueId;

pub(crate) const BINARY_MAGIC: &[u8; 3] = b"SPH";
pub(crate) const BINARY_VERSION: u8 = 1;

/// Writes `.ssf` snapshots: the header, one key-value block per
/// material, then one block per quantity with its buffers stored
/// little-endian without padding.
pub struct BinaryOutput;

impl BinaryOutput {
    pub fn save(path: &Path, storage: &Storage, meta: SnapshotMeta) -> Result<(), Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, storage, meta)?;
        for material in storage.materials() {
            write_material(&mut writer, material.params())?;
        }
        for (id, quantity) in storage.quantities() {
            write_quantity_header(&mut writer, id, quantity)?;
            for level in 0..=quantity.order().as_u8() as usize {
                let buffer = quantity.buffer(level).expect("order admits this level");
                write_buffer(&mut writer, &buffer)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Reads `.ssf` snapshots back into a storage. Quantity blocks follow
/// until the end of the file; materials are reconstructed from their
/// parameters and their quantity ranges reapplied.
pub struct BinaryInput;

impl BinaryInput {
    pub fn load(path: &Path) -> Result<(Storage, SnapshotMeta), Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let (particle_count, material_count, meta) = read_header(&mut reader)?;
        let mut storage = Storage::new();
        for _ in 0..material_count {
            let params = read_material(&mut reader)?;
            storage.push_material(material_from_params(params)?);
        }
        loop {
            // quantity blocks follow until the end of the file; only an
            // EOF right at a block boundary is a clean end
            let raw_id = match reader.read_u16::<LittleEndian>() {
                Ok(raw_id) => raw_id,
                Err(error) if error.kind() == ErrorKind::UnexpectedEof => break,
                Err(error) => return Err(error.into()),
            };
            let (id, quantity) = read_quantity_with_id(&mut reader, raw_id, particle_count)?;
            storage.insert_quantity(id, quantity);
        }
        if storage.particle_count() != particle_count {
            return Err(Error::Corrupted(format!(
                "snapshot announces {} particles but stores {}",
                particle_count,
                storage.particle_count()
            )));
        }
        // positions must carry a usable smoothing length
        if let Ok(positions) = storage.try_values::<Vector>(QuantityId::Position) {
            if positions.iter().any(|r| !(r.h() > 0.0)) {
                return Err(Error::Corrupted(
                    "snapshot positions carry non-positive smoothing lengths".to_owned(),
                ));
            }
        }
        let ranges: Vec<(QuantityId, Interval)> = storage
            .materials()
            .flat_map(|material| material.ranges())
            .collect();
        for (id, range) in ranges {
            storage.set_range(id, range);
        }
        Ok((storage, meta))
    }
}

fn write_header(
    writer: &mut impl Write,
    storage: &Storage,
    meta: SnapshotMeta,
) -> Result<(), Error> {
    writer.write_all(BINARY_MAGIC)?;
    writer.write_u8(BINARY_VERSION)?;
    writer.write_u64::<LittleEndian>(storage.particle_count() as u64)?;
    writer.write_u32::<LittleEndian>(storage.material_count() as u32)?;
    writer.write_u8(meta.run_type.as_u8())?;
    writer.write_f64::<LittleEndian>(meta.time)?;
    Ok(())
}

fn read_header(reader: &mut impl Read) -> Result<(usize, usize, SnapshotMeta), Error> {
    let mut magic = [0u8; 3];
    reader.read_exact(&mut magic)?;
    if &magic != BINARY_MAGIC {
        return Err(Error::Corrupted("not a binary snapshot".to_owned()));
    }
    let version = reader.read_u8()?;
    if version != BINARY_VERSION {
        return Err(Error::Corrupted(format!(
            "unsupported snapshot version {}",
            version
        )));
    }
    let particle_count = reader.read_u64::<LittleEndian>()? as usize;
    let material_count = reader.read_u32::<LittleEndian>()? as usize;
    let run_type = RunTypeId::from_u8(reader.read_u8()?)
        .ok_or_else(|| Error::Corrupted("unknown run type".to_owned()))?;
    let time = reader.read_f64::<LittleEndian>()?;
    Ok((
        particle_count,
        material_count,
        SnapshotMeta::new(time, run_type),
    ))
}

fn write_string(writer: &mut impl Write, string: &str) -> Result<(), Error> {
    writer.write_u32::<LittleEndian>(string.len() as u32)?;
    writer.write_all(string.as_bytes())?;
    Ok(())
}

fn read_string(reader: &mut impl Read) -> Result<String, Error> {
    let length = reader.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; length];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| Error::Corrupted("malformed string".to_owned()))
}

pub(crate) fn write_material(writer: &mut impl Write, params: &Settings) -> Result<(), Error> {
    let values: Vec<(&str, &Value)> = params.values().collect();
    writer.write_u32::<LittleEndian>(values.len() as u32)?;
    for (key, value) in values {
        write_string(writer, key)?;
        writer.write_u8(value.type_tag())?;
        match value {
            Value::Int(v) | Value::Enum(v) => writer.write_i64::<LittleEndian>(*v)?,
            Value::Float(v) => writer.write_f64::<LittleEndian>(*v)?,
            Value::Str(v) => write_string(writer, v)?,
            Value::Vector3(v) => {
                writer.write_f64::<LittleEndian>(v.x())?;
                writer.write_f64::<LittleEndian>(v.y())?;
                writer.write_f64::<LittleEndian>(v.z())?;
            }
            Value::Interval(v) => {
                writer.write_f64::<LittleEndian>(v.lower())?;
                writer.write_f64::<LittleEndian>(v.upper())?;
            }
        }
    }
    Ok(())
}

pub(crate) fn read_material(reader: &mut impl Read) -> Result<Settings, Error> {
    let count = reader.read_u32::<LittleEndian>()?;
    let mut params = Settings::new();
    for _ in 0..count {
        let key = read_string(reader)?;
        let tag = reader.read_u8()?;
        let value = match tag {
            0 => Value::Int(reader.read_i64::<LittleEndian>()?),
            1 => Value::Float(reader.read_f64::<LittleEndian>()?),
            2 => Value::Str(read_string(reader)?),
            3 => Value::Vector3(Vector::new(
                reader.read_f64::<LittleEndian>()?,
                reader.read_f64::<LittleEndian>()?,
                reader.read_f64::<LittleEndian>()?,
            )),
            4 => {
                let lower = reader.read_f64::<LittleEndian>()?;
                let upper = reader.read_f64::<LittleEndian>()?;
                Value::Interval(Interval::new(lower, upper))
            }
            5 => Value::Enum(reader.read_i64::<LittleEndian>()?),
            other => {
                return Err(Error::Corrupted(format!("unknown value tag {}", other)))
            }
        };
        params.set(&key, value);
    }
    Ok(params)
}

pub(crate) fn write_quantity_header(
    writer: &mut impl Write,
    id: QuantityId,
    quantity: &Quantity,
) -> Result<(), Error> {
    writer.write_u16::<LittleEndian>(id.as_u16())?;
    writer.write_u8(quantity.value_id().as_u8())?;
    writer.write_u8(quantity.order().as_u8())?;
    // reserved
    writer.write_u8(0)?;
    Ok(())
}

pub(crate) fn write_buffer(writer: &mut impl Write, buffer: &BufferRef) -> Result<(), Error> {
    match buffer {
        BufferRef::Scalar(values) => {
            for value in *values {
                writer.write_f64::<LittleEndian>(*value)?;
            }
        }
        BufferRef::Vector(values) => {
            for value in *values {
                for component in 0..4 {
                    writer.write_f64::<LittleEndian>(value[component])?;
                }
            }
        }
        BufferRef::Tensor(values) => {
            for value in *values {
                for i in 0..3 {
                    for j in 0..3 {
                        writer.write_f64::<LittleEndian>(value.component(i, j))?;
                    }
                }
            }
        }
        BufferRef::SymTensor(values) => {
            for value in *values {
                let diag = value.diagonal();
                let off = value.off_diagonal();
                for component in [diag.x(), diag.y(), diag.z(), off.x(), off.y(), off.z()] {
                    writer.write_f64::<LittleEndian>(component)?;
                }
            }
        }
        BufferRef::TracelessTensor(values) => {
            for value in *values {
                let diag = value.diagonal();
                let off = value.off_diagonal();
                for component in [diag.x(), diag.y(), off.x(), off.y(), off.z()] {
                    writer.write_f64::<LittleEndian>(component)?;
                }
            }
        }
        BufferRef::Index(values) => {
            for value in *values {
                writer.write_u32::<LittleEndian>(*value)?;
            }
        }
    }
    Ok(())
}

struct QuantityHeader {
    id: QuantityId,
    value_id: ValueId,
    order: OrderEnum,
}

fn read_quantity_header(reader: &mut impl Read, raw_id: u16) -> Result<QuantityHeader, Error> {
    let id = QuantityId::from_u16(raw_id)
        .ok_or_else(|| Error::Corrupted(format!("unknown quantity id {}", raw_id)))?;
    let value_id = reader.read_u8()?;
    let value_id = ValueId::from_u8(value_id)
        .ok_or_else(|| Error::Corrupted(format!("unknown value type {}", value_id)))?;
    let order = reader.read_u8()?;
    let order = OrderEnum::from_u8(order)
        .ok_or_else(|| Error::Corrupted(format!("unknown order {}", order)))?;
    // reserved
    reader.read_u8()?;
    Ok(QuantityHeader {
        id,
        value_id,
        order,
    })
}

fn read_values<T>(
    reader: &mut impl Read,
    count: usize,
    mut read_one: impl FnMut(&mut dyn Read) -> Result<T, Error>,
) -> Result<Vec<T>, Error> {
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_one(reader)?);
    }
    Ok(values)
}

fn read_typed_quantity<T, R>(
    reader: &mut R,
    count: usize,
    order: OrderEnum,
    mut read_one: impl FnMut(&mut dyn Read) -> Result<T, Error>,
) -> Result<Quantity, Error>
where
    T: crate::storage::BufferValue,
    R: Read,
    Holder<T>: Into<crate::storage::QuantityData>,
{
    let values = read_values(reader, count, &mut read_one)?;
    let mut holder = Holder::from_values(order, values);
    if order >= OrderEnum::First {
        holder.set_derivative_buffer(1, read_values(reader, count, &mut read_one)?);
    }
    if order == OrderEnum::Second {
        holder.set_derivative_buffer(2, read_values(reader, count, &mut read_one)?);
    }
    Ok(Quantity::new(holder))
}

fn read_f64(reader: &mut dyn Read) -> Result<Float, Error> {
    Ok(reader.read_f64::<LittleEndian>()?)
}

pub(crate) fn read_quantity_with_id(
    reader: &mut impl Read,
    raw_id: u16,
    count: usize,
) -> Result<(QuantityId, Quantity), Error> {
    let header = read_quantity_header(reader, raw_id)?;
    let quantity = match header.value_id {
        ValueId::Scalar => read_typed_quantity(reader, count, header.order, read_f64)?,
        ValueId::Vector => read_typed_quantity(reader, count, header.order, |reader| {
            Ok(Vector::with_h(
                read_f64(reader)?,
                read_f64(reader)?,
                read_f64(reader)?,
                read_f64(reader)?,
            ))
        })?,
        ValueId::Tensor => read_typed_quantity(reader, count, header.order, |reader| {
            let mut rows = [Vector::ZERO; 3];
            for row in &mut rows {
                *row = Vector::new(read_f64(reader)?, read_f64(reader)?, read_f64(reader)?);
            }
            Ok(Tensor::new(rows))
        })?,
        ValueId::SymTensor => read_typed_quantity(reader, count, header.order, |reader| {
            let diag = Vector::new(read_f64(reader)?, read_f64(reader)?, read_f64(reader)?);
            let off = Vector::new(read_f64(reader)?, read_f64(reader)?, read_f64(reader)?);
            Ok(SymTensor::new(diag, off))
        })?,
        ValueId::TracelessTensor => read_typed_quantity(reader, count, header.order, |reader| {
            let xx = read_f64(reader)?;
            let yy = read_f64(reader)?;
            Ok(TracelessTensor::new(
                xx,
                yy,
                read_f64(reader)?,
                read_f64(reader)?,
                read_f64(reader)?,
            ))
        })?,
        ValueId::Index => read_typed_quantity(reader, count, header.order, |reader| {
            Ok(reader.read_u32::<LittleEndian>()?)
        })?,
    };
    Ok((header.id, quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::VisitorFlags;
    use crate::test_utils::gas_lattice_storage;

    fn snapshot_fixture() -> Storage {
        let mut storage = gas_lattice_storage(2, 1.0);
        storage
            .insert(
                QuantityId::DeviatoricStress,
                OrderEnum::First,
                TracelessTensor::new(1.0, -2.0, 0.5, 0.25, -0.125),
            )
            .unwrap();
        storage
            .insert_with_values(
                QuantityId::MaterialIdx,
                OrderEnum::Zero,
                vec![0; storage.particle_count()],
            )
            .unwrap();
        let mut params = Settings::new();
        params.set("density", Value::Float(2700.0));
        params.set("label", Value::Str("target".to_owned()));
        params.set("center", Value::Vector3(Vector::new(1.0, 2.0, 3.0)));
        params.set("damage_range", Value::Interval(Interval::new(0.0, 1.0)));
        storage.push_material(crate::test_utils::material_with_params(params));
        // put recognizable values into the derivative buffers
        storage.dt_mut::<Float>(QuantityId::Density).fill(-0.125);
        storage.d2t_mut::<Vector>(QuantityId::Position)[7] = Vector::new(0.5, -0.5, 4.0);
        storage
    }

    #[test]
    fn binary_round_trip_is_exact() {
        let storage = snapshot_fixture();
        let dir = std::env::temp_dir().join("rubble_binary_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("snapshot.ssf");
        BinaryOutput::save(&path, &storage, SnapshotMeta::new(2.5, RunTypeId::Sph)).unwrap();
        let (loaded, meta) = BinaryInput::load(&path).unwrap();
        assert_eq!(meta, SnapshotMeta::new(2.5, RunTypeId::Sph));
        assert_eq!(loaded.particle_count(), storage.particle_count());
        assert_eq!(loaded.material_count(), 1);
        // bit-for-bit equality of every buffer
        for (id, quantity) in storage.quantities() {
            let other = loaded.quantity(id).expect("quantity survives");
            assert_eq!(quantity.data(), other.data(), "{:?}", id);
        }
        // material parameters survive
        assert_eq!(
            loaded.material(0).params().get_float("density").unwrap(),
            2700.0
        );
        assert_eq!(
            loaded.material(0).params().get_str("label").unwrap(),
            "target"
        );
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn truncated_snapshot_is_rejected() {
        let storage = snapshot_fixture();
        let dir = std::env::temp_dir().join("rubble_binary_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("truncated.ssf");
        BinaryOutput::save(&path, &storage, SnapshotMeta::new(0.0, RunTypeId::Sph)).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(BinaryInput::load(&path).is_err());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn clone_survives_the_same_buffers() {
        // guards the fixture against silent storage changes
        let storage = snapshot_fixture();
        let cloned = storage.clone_flags(VisitorFlags::ALL_BUFFERS);
        for (id, quantity) in storage.quantities() {
            assert_eq!(quantity.data(), cloned.quantity(id).unwrap().data());
        }
    }
}
