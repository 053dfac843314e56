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
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::Error;
use crate::io::binary;
use crate::io::RunTypeId;
use crate::io::SnapshotMeta;
use crate::materials::material_from_params;
#[cfg(test)]
use crate::storage::QuantityId;
use crate::storage::Storage;

const COMPRESSED_MAGIC: &[u8; 3] = b"SCF";
const COMPRESSED_VERSION: u8 = 1;

/// The uncompressed info record at the start of a `.scf` snapshot:
/// everything a browser needs without touching the bulk data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapshotInfo {
    pub particle_count: usize,
    pub material_count: usize,
    pub meta: SnapshotMeta,
}

/// Writes `.scf` snapshots: the same logical content as the binary
/// format, with each quantity buffer compressed independently (zlib)
/// so a reader can skip buffers it does not need.
pub struct CompressedOutput;

impl CompressedOutput {
    pub fn save(path: &Path, storage: &Storage, meta: SnapshotMeta) -> Result<(), Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(COMPRESSED_MAGIC)?;
        writer.write_u8(COMPRESSED_VERSION)?;
        writer.write_u64::<LittleEndian>(storage.particle_count() as u64)?;
        writer.write_u32::<LittleEndian>(storage.material_count() as u32)?;
        writer.write_u8(meta.run_type.as_u8())?;
        writer.write_f64::<LittleEndian>(meta.time)?;
        for material in storage.materials() {
            binary::write_material(&mut writer, material.params())?;
        }
        for (id, quantity) in storage.quantities() {
            binary::write_quantity_header(&mut writer, id, quantity)?;
            for level in 0..=quantity.order().as_u8() as usize {
                let buffer = quantity.buffer(level).expect("order admits this level");
                let mut plain = Vec::new();
                binary::write_buffer(&mut plain, &buffer)?;
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&plain)?;
                let compressed = encoder.finish()?;
                writer.write_u64::<LittleEndian>(compressed.len() as u64)?;
                writer.write_all(&compressed)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

pub struct CompressedInput;

impl CompressedInput {
    /// Reads only the info record; no bulk data is decompressed.
    pub fn info(path: &Path) -> Result<SnapshotInfo, Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_info(&mut reader)
    }

    fn read_info(reader: &mut impl Read) -> Result<SnapshotInfo, Error> {
        let mut magic = [0u8; 3];
        reader.read_exact(&mut magic)?;
        if &magic != COMPRESSED_MAGIC {
            return Err(Error::Corrupted("not a compressed snapshot".to_owned()));
        }
        let version = reader.read_u8()?;
        if version != COMPRESSED_VERSION {
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
        Ok(SnapshotInfo {
            particle_count,
            material_count,
            meta: SnapshotMeta::new(time, run_type),
        })
    }

    pub fn load(path: &Path) -> Result<(Storage, SnapshotMeta), Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let info = Self::read_info(&mut reader)?;
        let mut storage = Storage::new();
        for _ in 0..info.material_count {
            let params = binary::read_material(&mut reader)?;
            storage.push_material(material_from_params(params)?);
        }
        loop {
            let raw_id = match reader.read_u16::<LittleEndian>() {
                Ok(raw_id) => raw_id,
                Err(error) if error.kind() == ErrorKind::UnexpectedEof => break,
                Err(error) => return Err(error.into()),
            };
            // re-assemble an uncompressed quantity block, then reuse the
            // binary reader
            let value_id = reader.read_u8()?;
            let order = reader.read_u8()?;
            if order > 2 {
                return Err(Error::Corrupted(format!("unknown order {}", order)));
            }
            let reserved = reader.read_u8()?;
            let buffer_count = order as usize + 1;
            let mut plain = Vec::new();
            plain.write_u16::<LittleEndian>(raw_id)?;
            plain.write_u8(value_id)?;
            plain.write_u8(order)?;
            plain.write_u8(reserved)?;
            for _ in 0..buffer_count {
                let compressed_len = reader.read_u64::<LittleEndian>()? as usize;
                let mut compressed = vec![0u8; compressed_len];
                reader.read_exact(&mut compressed)?;
                let mut decoder = ZlibDecoder::new(compressed.as_slice());
                decoder.read_to_end(&mut plain)?;
            }
            let mut plain_reader = plain.as_slice();
            let raw_id = plain_reader.read_u16::<LittleEndian>()?;
            let (id, quantity) =
                binary::read_quantity_with_id(&mut plain_reader, raw_id, info.particle_count)?;
            storage.insert_quantity(id, quantity);
        }
        if storage.particle_count() != info.particle_count {
            return Err(Error::Corrupted(format!(
                "snapshot announces {} particles but stores {}",
                info.particle_count,
                storage.particle_count()
            )));
        }
        Ok((storage, info.meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::Float;
    use crate::test_utils::gas_lattice_storage;

    #[test]
    fn compressed_round_trip_is_exact() {
        let mut storage = gas_lattice_storage(2, 1.0);
        for (i, rho) in storage
            .values_mut::<Float>(QuantityId::Density)
            .iter_mut()
            .enumerate()
        {
            *rho = 1000.0 + i as Float;
        }
        let dir = std::env::temp_dir().join("rubble_compressed_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("snapshot.scf");
        CompressedOutput::save(&path, &storage, SnapshotMeta::new(1.5, RunTypeId::Nbody))
            .unwrap();

        let info = CompressedInput::info(&path).unwrap();
        assert_eq!(info.particle_count, storage.particle_count());
        assert_eq!(info.meta.time, 1.5);
        assert_eq!(info.meta.run_type, RunTypeId::Nbody);

        let (loaded, meta) = CompressedInput::load(&path).unwrap();
        assert_eq!(meta.run_type, RunTypeId::Nbody);
        for (id, quantity) in storage.quantities() {
            assert_eq!(quantity.data(), loaded.quantity(id).unwrap().data());
        }
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn compression_shrinks_uniform_buffers() {
        let storage = gas_lattice_storage(3, 1.0);
        let dir = std::env::temp_dir().join("rubble_compressed_test");
        std::fs::create_dir_all(&dir).unwrap();
        let compressed_path = dir.join("size.scf");
        let binary_path = dir.join("size.ssf");
        CompressedOutput::save(
            &compressed_path,
            &storage,
            SnapshotMeta::new(0.0, RunTypeId::Sph),
        )
        .unwrap();
        crate::io::BinaryOutput::save(
            &binary_path,
            &storage,
            SnapshotMeta::new(0.0, RunTypeId::Sph),
        )
        .unwrap();
        let compressed_size = std::fs::metadata(&compressed_path).unwrap().len();
        let binary_size = std::fs::metadata(&binary_path).unwrap().len();
        assert!(compressed_size < binary_size / 2);
        std::fs::remove_file(compressed_path).unwrap();
        std::fs::remove_file(binary_path).unwrap();
    }
}
