//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use enum_as_inner::EnumAsInner;
use generational_arena::Index;
use serde::{Deserialize, Serialize};

use crate::area::Area;
use crate::error::Error;
use crate::instance::ProtocolInputChannelsTx;
use crate::interface::Interface;
use crate::lsdb::{LsaDelayedOrig, LsaEntry};
use crate::neighbor::{Neighbor, NeighborNetId};
use crate::packet::lsa::{Lsa, LsaKey, LsaType};
use crate::tasks;
use crate::tasks::IntervalTask;

pub type ObjectId = u32;

#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub enum ObjectKey<T> {
    Id(ObjectId),
    Value(T),
}

pub type AreaId = ObjectId;
pub type AreaIndex = Index;
pub type AreaKey = ObjectKey<Ipv4Addr>;
pub type InterfaceId = ObjectId;
pub type InterfaceIndex = Index;
pub type InterfaceKey = ObjectKey<String>;
pub type NeighborId = ObjectId;
pub type NeighborIndex = Index;
pub type NeighborKey = ObjectKey<Ipv4Addr>;
pub type LsaEntryId = ObjectId;
pub type LsaEntryIndex = Index;
pub type LsaEntryKey = ObjectKey<LsaKey>;

#[derive(Debug)]
pub struct Arena<T>(generational_arena::Arena<T>);

#[derive(Debug, Default)]
pub struct Areas {
    arena: Arena<Area>,
    id_tree: HashMap<AreaId, AreaIndex>,
    area_id_tree: BTreeMap<Ipv4Addr, AreaIndex>,
    next_id: AreaId,
}

#[derive(Debug, Default)]
pub struct Interfaces {
    id_tree: HashMap<InterfaceId, InterfaceIndex>,
    name_tree: BTreeMap<String, InterfaceIndex>,
    next_id: InterfaceId,
}

#[derive(Debug, Default)]
pub struct Neighbors {
    id_tree: HashMap<NeighborId, NeighborIndex>,
    router_id_tree: BTreeMap<Ipv4Addr, NeighborIndex>,
    net_id_tree: BTreeMap<NeighborNetId, NeighborIndex>,
    next_id: NeighborId,
}

#[derive(Debug)]
pub struct Lsdb {
    id_tree: HashMap<LsaEntryId, LsaEntryIndex>,
    tree: BTreeMap<LsaType, LsdbSingleType>,
    // List of MaxAge LSAs.
    pub maxage_lsas: HashSet<LsaEntryIndex>,
    maxage_sweeper: Option<IntervalTask>,
    // List of LSAs whose origination was delayed due to the MinLSInterval
    // check.
    pub delayed_orig: HashMap<LsaKey, LsaDelayedOrig>,
    // List of LSAs whose sequence number is wrapping.
    pub seqno_wrapping: HashMap<LsaKey, Lsa>,
    next_id: LsaEntryId,
}

#[derive(Debug)]
pub struct LsdbSingleType {
    lsa_type: LsaType,
    tree: BTreeMap<LsaKey, LsaEntryIndex>,
}

// LSDB ID.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsdbId {
    Area(AreaId),
    As,
}

// LSDB Index.
#[derive(Clone, Copy, Debug, EnumAsInner, Eq, PartialEq)]
pub enum LsdbIndex {
    Area(AreaIndex),
    As,
}

// LSDB key.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub enum LsdbKey {
    Area(AreaKey),
    As,
}

// ===== impl ObjectKey =====

impl<T> From<ObjectId> for ObjectKey<T> {
    fn from(id: ObjectId) -> ObjectKey<T> {
        ObjectKey::Id(id)
    }
}

// ===== impl Arena =====

impl<T> Arena<T> {
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.0.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
        self.0.iter_mut()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena(Default::default())
    }
}

impl<T> std::ops::Index<Index> for Arena<T> {
    type Output = T;

    fn index(&self, index: Index) -> &Self::Output {
        &self.0[index]
    }
}

impl<T> std::ops::IndexMut<Index> for Arena<T> {
    fn index_mut(&mut self, index: Index) -> &mut Self::Output {
        &mut self.0[index]
    }
}

// ===== impl Areas =====

impl Areas {
    pub(crate) fn insert(&mut self, area_id: Ipv4Addr) -> (AreaIndex, &mut Area) {
        // Create and insert area into the arena.
        self.next_id += 1;
        let area = Area::new(self.next_id, area_id);
        let area_idx = self.arena.0.insert(area);

        // Link area to different collections.
        let area = &mut self.arena[area_idx];
        self.id_tree.insert(area.id, area_idx);
        if self.area_id_tree.insert(area.area_id, area_idx).is_some() {
            panic!("area area-id={} already exists", area.area_id);
        }

        (area_idx, area)
    }

    // Returns a reference to the area corresponding to the given ID.
    pub(crate) fn get_by_id(
        &self,
        id: AreaId,
    ) -> Result<(AreaIndex, &Area), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|area_idx| (area_idx, &self.arena[area_idx]))
            .filter(|(_, area)| area.id == id)
            .ok_or(Error::AreaIdNotFound(id))
    }

    // Returns a mutable reference to the area corresponding to the given ID.
    pub(crate) fn get_mut_by_id(
        &mut self,
        id: AreaId,
    ) -> Result<(AreaIndex, &mut Area), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(move |area_idx| (area_idx, &mut self.arena[area_idx]))
            .filter(|(_, area)| area.id == id)
            .ok_or(Error::AreaIdNotFound(id))
    }

    // Returns a reference to the area corresponding to the given area ID.
    pub(crate) fn get_by_area_id(
        &self,
        area_id: Ipv4Addr,
    ) -> Option<(AreaIndex, &Area)> {
        self.area_id_tree
            .get(&area_id)
            .copied()
            .map(|area_idx| (area_idx, &self.arena[area_idx]))
    }

    // Returns a mutable reference to the area corresponding to the given area
    // ID.
    pub(crate) fn get_mut_by_area_id(
        &mut self,
        area_id: Ipv4Addr,
    ) -> Option<(AreaIndex, &mut Area)> {
        self.area_id_tree
            .get(&area_id)
            .copied()
            .map(move |area_idx| (area_idx, &mut self.arena[area_idx]))
    }

    // Returns a reference to the area corresponding to the given object key.
    pub(crate) fn get_by_key(
        &self,
        key: &AreaKey,
    ) -> Result<(AreaIndex, &Area), Error> {
        match key {
            AreaKey::Id(id) => self.get_by_id(*id),
            AreaKey::Value(area_id) => {
                Ok(self.get_by_area_id(*area_id).unwrap())
            }
        }
    }

    // Returns a mutable reference to the area corresponding to the given
    // object key.
    pub(crate) fn get_mut_by_key(
        &mut self,
        key: &AreaKey,
    ) -> Result<(AreaIndex, &mut Area), Error> {
        match key {
            AreaKey::Id(id) => self.get_mut_by_id(*id),
            AreaKey::Value(area_id) => {
                Ok(self.get_mut_by_area_id(*area_id).unwrap())
            }
        }
    }

    // Returns an iterator visiting all areas.
    //
    // Areas are ordered by their area IDs.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Area> {
        self.area_id_tree
            .values()
            .map(|area_idx| &self.arena[*area_idx])
    }

    // Returns an iterator over all area indexes.
    //
    // Areas are ordered by their area IDs.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = AreaIndex> + '_ {
        self.area_id_tree.values().copied()
    }

    // Returns whether we're an area border router.
    pub(crate) fn is_abr(&self, interfaces: &Arena<Interface>) -> bool {
        self.iter()
            .filter(|area| area.is_active(interfaces))
            .count()
            > 1
    }
}

impl std::ops::Index<AreaIndex> for Areas {
    type Output = Area;

    fn index(&self, index: AreaIndex) -> &Self::Output {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<AreaIndex> for Areas {
    fn index_mut(&mut self, index: AreaIndex) -> &mut Self::Output {
        &mut self.arena[index]
    }
}

// ===== impl Interfaces =====

impl Interfaces {
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        ifname: &str,
    ) -> (InterfaceIndex, &'a mut Interface) {
        // Create and insert interface into the arena.
        self.next_id += 1;
        let iface = Interface::new(self.next_id, ifname.to_owned());
        let iface_idx = arena.0.insert(iface);

        // Link interface to different collections.
        let iface = &mut arena[iface_idx];
        self.id_tree.insert(iface.id, iface_idx);
        if self
            .name_tree
            .insert(iface.name.clone(), iface_idx)
            .is_some()
        {
            panic!("interface name={} already exists", iface.name);
        }

        (iface_idx, iface)
    }

    // Returns a reference to the interface corresponding to the given ID.
    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<Interface>,
        id: InterfaceId,
    ) -> Result<(InterfaceIndex, &'a Interface), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|iface_idx| (iface_idx, &arena[iface_idx]))
            .filter(|(_, iface)| iface.id == id)
            .ok_or(Error::InterfaceIdNotFound(id))
    }

    // Returns a mutable reference to the interface corresponding to the given
    // ID.
    pub(crate) fn get_mut_by_id<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        id: InterfaceId,
    ) -> Result<(InterfaceIndex, &'a mut Interface), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(move |iface_idx| (iface_idx, &mut arena[iface_idx]))
            .filter(|(_, iface)| iface.id == id)
            .ok_or(Error::InterfaceIdNotFound(id))
    }

    // Returns a reference to the interface corresponding to the given name.
    pub(crate) fn get_by_name<'a>(
        &self,
        arena: &'a Arena<Interface>,
        ifname: &str,
    ) -> Option<(InterfaceIndex, &'a Interface)> {
        self.name_tree
            .get(ifname)
            .copied()
            .map(|iface_idx| (iface_idx, &arena[iface_idx]))
    }

    // Returns a mutable reference to the interface corresponding to the given
    // name.
    pub(crate) fn get_mut_by_name<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        ifname: &str,
    ) -> Option<(InterfaceIndex, &'a mut Interface)> {
        self.name_tree
            .get(ifname)
            .copied()
            .map(move |iface_idx| (iface_idx, &mut arena[iface_idx]))
    }

    // Returns a mutable reference to the interface whose primary address
    // matches the given IP address.
    pub(crate) fn get_mut_by_addr<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        addr: Ipv4Addr,
    ) -> Option<(InterfaceIndex, &'a mut Interface)> {
        for (iface_idx, iface) in arena.iter_mut() {
            if let Some(primary_addr) = iface.system.primary_addr
                && primary_addr.ip() == addr
            {
                return Some((iface_idx, iface));
            }
        }

        None
    }

    // Returns a reference to the interface corresponding to the given object
    // key.
    pub(crate) fn get_by_key<'a>(
        &self,
        arena: &'a Arena<Interface>,
        key: &InterfaceKey,
    ) -> Result<(InterfaceIndex, &'a Interface), Error> {
        match key {
            InterfaceKey::Id(id) => self.get_by_id(arena, *id),
            InterfaceKey::Value(ifname) => {
                Ok(self.get_by_name(arena, ifname).unwrap())
            }
        }
    }

    // Returns a mutable reference to the interface corresponding to the given
    // object key.
    pub(crate) fn get_mut_by_key<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        key: &InterfaceKey,
    ) -> Result<(InterfaceIndex, &'a mut Interface), Error> {
        match key {
            InterfaceKey::Id(id) => self.get_mut_by_id(arena, *id),
            InterfaceKey::Value(ifname) => {
                Ok(self.get_mut_by_name(arena, ifname).unwrap())
            }
        }
    }

    // Returns an iterator visiting all interfaces.
    //
    // Interfaces are ordered by their names.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<Interface>,
    ) -> impl Iterator<Item = &'a Interface> + 'a {
        self.name_tree.values().map(|iface_idx| &arena[*iface_idx])
    }

    // Returns an iterator over all interface indexes.
    //
    // Interfaces are ordered by their names.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = InterfaceIndex> + '_ {
        self.name_tree.values().copied()
    }
}

// ===== impl Neighbors =====

impl Neighbors {
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
    ) -> (NeighborIndex, &'a mut Neighbor) {
        // Create and insert neighbor into the arena.
        self.next_id += 1;
        let nbr = Neighbor::new(self.next_id, router_id, src);
        let nbr_idx = arena.0.insert(nbr);

        // Link neighbor to different collections.
        let nbr = &mut arena[nbr_idx];
        let nbr_net_id = nbr.network_id();
        self.id_tree.insert(nbr.id, nbr_idx);
        self.router_id_tree.insert(nbr.router_id, nbr_idx);
        self.net_id_tree.insert(nbr_net_id, nbr_idx);

        (nbr_idx, nbr)
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<Neighbor>,
        nbr_idx: NeighborIndex,
    ) {
        let nbr = &mut arena[nbr_idx];
        let nbr_net_id = nbr.network_id();

        // Unlink neighbor from different collections.
        self.id_tree.remove(&nbr.id);
        self.router_id_tree.remove(&nbr.router_id);
        self.net_id_tree.remove(&nbr_net_id);

        // Remove neighbor from the arena.
        arena.0.remove(nbr_idx);
    }

    pub(crate) fn update_router_id(
        &mut self,
        nbr_idx: NeighborIndex,
        nbr: &mut Neighbor,
        router_id: Ipv4Addr,
    ) {
        self.router_id_tree.remove(&nbr.router_id);
        nbr.router_id = router_id;
        self.router_id_tree.insert(nbr.router_id, nbr_idx);
    }

    // Returns a reference to the neighbor corresponding to the given ID.
    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<Neighbor>,
        id: NeighborId,
    ) -> Result<(NeighborIndex, &'a Neighbor), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|nbr_idx| (nbr_idx, &arena[nbr_idx]))
            .filter(|(_, nbr)| nbr.id == id)
            .ok_or(Error::NeighborIdNotFound(id))
    }

    // Returns a mutable reference to the neighbor corresponding to the given
    // ID.
    pub(crate) fn get_mut_by_id<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        id: NeighborId,
    ) -> Result<(NeighborIndex, &'a mut Neighbor), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(move |nbr_idx| (nbr_idx, &mut arena[nbr_idx]))
            .filter(|(_, nbr)| nbr.id == id)
            .ok_or(Error::NeighborIdNotFound(id))
    }

    // Returns a mutable reference to the neighbor corresponding to the given
    // Router ID.
    pub(crate) fn get_mut_by_router_id<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        router_id: Ipv4Addr,
    ) -> Option<(NeighborIndex, &'a mut Neighbor)> {
        self.router_id_tree
            .get(&router_id)
            .copied()
            .map(move |nbr_idx| (nbr_idx, &mut arena[nbr_idx]))
    }

    // Returns a reference to the neighbor corresponding to the given
    // multi-access network ID.
    pub(crate) fn get_by_net_id<'a>(
        &self,
        arena: &'a Arena<Neighbor>,
        net_id: NeighborNetId,
    ) -> Option<(NeighborIndex, &'a Neighbor)> {
        self.net_id_tree
            .get(&net_id)
            .copied()
            .map(|nbr_idx| (nbr_idx, &arena[nbr_idx]))
    }

    // Returns a mutable reference to the neighbor corresponding to the given
    // multi-access network ID.
    pub(crate) fn get_mut_by_net_id<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        net_id: NeighborNetId,
    ) -> Option<(NeighborIndex, &'a mut Neighbor)> {
        self.net_id_tree
            .get(&net_id)
            .copied()
            .map(move |nbr_idx| (nbr_idx, &mut arena[nbr_idx]))
    }

    // Returns a mutable reference to the neighbor corresponding to the given
    // object key.
    pub(crate) fn get_mut_by_key<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        key: &NeighborKey,
    ) -> Result<(NeighborIndex, &'a mut Neighbor), Error> {
        match key {
            NeighborKey::Id(id) => self.get_mut_by_id(arena, *id),
            NeighborKey::Value(router_id) => {
                Ok(self.get_mut_by_router_id(arena, *router_id).unwrap())
            }
        }
    }

    // Returns an iterator visiting all neighbors.
    //
    // Neighbors are ordered by their Router IDs.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<Neighbor>,
    ) -> impl Iterator<Item = &'a Neighbor> + 'a {
        self.router_id_tree.values().map(|nbr_idx| &arena[*nbr_idx])
    }

    // Returns an iterator over all neighbor Router IDs.
    //
    // Neighbors are ordered by their Router IDs.
    pub(crate) fn router_ids(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.router_id_tree.keys().copied()
    }

    // Returns an iterator over all neighbor indexes.
    //
    // Neighbors are ordered by their Router IDs.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = NeighborIndex> + '_ {
        self.router_id_tree.values().copied()
    }
}

// ===== impl Lsdb =====

impl Lsdb {
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<LsaEntry>,
        lsdb_id: LsdbId,
        lsa: Arc<Lsa>,
        protocol_input: &ProtocolInputChannelsTx,
    ) -> (LsaEntryIndex, &'a mut LsaEntry) {
        let key = lsa.hdr.key();

        // Create and insert LSA into the arena.
        let next_id = self.next_id + 1;
        self.next_id = next_id;
        let lse =
            LsaEntry::new(lsdb_id, next_id, lsa, &protocol_input.lsa_flush);
        let lse_idx = arena.0.insert(lse);

        // Link LSA to different collections.
        let lse = &mut arena[lse_idx];
        self.id_tree.insert(lse.id, lse_idx);
        let lsdb_type =
            self.tree
                .entry(key.lsa_type)
                .or_insert_with(|| LsdbSingleType {
                    lsa_type: key.lsa_type,
                    tree: Default::default(),
                });
        if lsdb_type.tree.insert(key, lse_idx).is_some() {
            panic!("LSA key={key:?} already exists");
        }

        // If the LSA's age is MaxAge, update the MaxAge list and schedule the
        // LSA removal.
        if lse.data.hdr.is_maxage() {
            self.maxage_lsas.insert(lse_idx);
            if self.maxage_sweeper.is_none() {
                let task = tasks::lsdb_maxage_sweep_interval(
                    lsdb_id,
                    &protocol_input.lsdb_maxage_sweep_interval,
                );
                self.maxage_sweeper = Some(task);
            }
        }

        (lse_idx, lse)
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<LsaEntry>,
        lse_idx: LsaEntryIndex,
    ) {
        let lse = &mut arena[lse_idx];
        let key = lse.data.hdr.key();
        let lsdb_type = self.tree.get_mut(&key.lsa_type).unwrap();

        // Unlink LSA from different collections.
        self.id_tree.remove(&lse.id);
        lsdb_type.tree.remove(&key);
        if lsdb_type.tree.is_empty() {
            self.tree.remove(&key.lsa_type);
        }

        // Remove LSA from MaxAge list.
        self.maxage_lsas.remove(&lse_idx);
        if self.maxage_lsas.is_empty() {
            self.maxage_sweeper = None;
        }

        // Remove LSA from the arena.
        arena.0.remove(lse_idx);
    }

    pub(crate) fn clear(&mut self, arena: &mut Arena<LsaEntry>) {
        for lse_idx in self.id_tree.values() {
            arena.0.remove(*lse_idx).unwrap();
        }
        self.id_tree.clear();
        self.tree.clear();
        self.maxage_lsas.clear();
        self.maxage_sweeper = None;
        self.delayed_orig.clear();
        self.seqno_wrapping.clear();
    }

    // Returns a reference to the LSA corresponding to the given ID.
    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<LsaEntry>,
        id: LsaEntryId,
    ) -> Result<(LsaEntryIndex, &'a LsaEntry), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|lse_idx| (lse_idx, &arena[lse_idx]))
            .filter(|(_, lse)| lse.id == id)
            .ok_or(Error::LsaEntryIdNotFound(id))
    }

    // Returns a mutable reference to the LSA corresponding to the given ID.
    pub(crate) fn get_mut_by_id<'a>(
        &mut self,
        arena: &'a mut Arena<LsaEntry>,
        id: LsaEntryId,
    ) -> Result<(LsaEntryIndex, &'a mut LsaEntry), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(move |lse_idx| (lse_idx, &mut arena[lse_idx]))
            .filter(|(_, lse)| lse.id == id)
            .ok_or(Error::LsaEntryIdNotFound(id))
    }

    // Returns a reference to the LSA corresponding to the given LSA key.
    pub(crate) fn get<'a>(
        &self,
        arena: &'a Arena<LsaEntry>,
        key: &LsaKey,
    ) -> Option<(LsaEntryIndex, &'a LsaEntry)> {
        self.tree
            .get(&key.lsa_type)
            .and_then(|lsdb_type| lsdb_type.tree.get(key).copied())
            .map(move |lse_idx| (lse_idx, &arena[lse_idx]))
    }

    // Returns a reference to the LSA corresponding to the given object key.
    pub(crate) fn get_by_key<'a>(
        &self,
        arena: &'a Arena<LsaEntry>,
        key: &LsaEntryKey,
    ) -> Result<(LsaEntryIndex, &'a LsaEntry), Error> {
        match key {
            LsaEntryKey::Id(id) => self.get_by_id(arena, *id),
            LsaEntryKey::Value(key) => Ok(self.get(arena, key).unwrap()),
        }
    }

    // Returns a mutable reference to the LSA corresponding to the given
    // object key.
    pub(crate) fn get_mut_by_key<'a>(
        &mut self,
        arena: &'a mut Arena<LsaEntry>,
        key: &LsaEntryKey,
    ) -> Result<(LsaEntryIndex, &'a mut LsaEntry), Error> {
        match key {
            LsaEntryKey::Id(id) => self.get_mut_by_id(arena, *id),
            LsaEntryKey::Value(key) => {
                let lse_idx = self
                    .tree
                    .get(&key.lsa_type)
                    .and_then(|lsdb_type| lsdb_type.tree.get(key).copied())
                    .unwrap();
                Ok((lse_idx, &mut arena[lse_idx]))
            }
        }
    }

    // Returns an iterator visiting all LSAs.
    //
    // LSAs are ordered by their keys.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry>,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry)> + 'a {
        self.tree
            .values()
            .flat_map(|lsdb_type| lsdb_type.iter(arena))
    }

    // Returns an iterator visiting all LSAs of the given type and advertising
    // router.
    //
    // LSAs are ordered by their keys.
    pub(crate) fn iter_by_type_advrtr<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry>,
        lsa_type: LsaType,
        adv_rtr: Ipv4Addr,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry)> + 'a {
        self.tree
            .get(&lsa_type)
            .into_iter()
            .flat_map(move |lsdb_type| {
                lsdb_type.iter_by_type_advrtr(arena, adv_rtr)
            })
    }
}

impl Default for Lsdb {
    fn default() -> Lsdb {
        Lsdb {
            id_tree: Default::default(),
            tree: BTreeMap::new(),
            maxage_lsas: Default::default(),
            maxage_sweeper: Default::default(),
            delayed_orig: Default::default(),
            seqno_wrapping: Default::default(),
            next_id: Default::default(),
        }
    }
}

// ===== impl LsdbSingleType =====

impl LsdbSingleType {
    // Returns an iterator visiting all LSAs.
    //
    // LSAs are ordered by their keys.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry>,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry)> + 'a {
        self.tree
            .values()
            .map(|lse_idx| (*lse_idx, &arena[*lse_idx]))
    }

    // Returns an iterator visiting all LSAs of the given advertising router.
    //
    // LSAs are ordered by their keys.
    pub(crate) fn iter_by_type_advrtr<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry>,
        adv_rtr: Ipv4Addr,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry)> + 'a {
        let begin = LsaKey {
            lsa_type: self.lsa_type,
            adv_rtr,
            lsa_id: Ipv4Addr::new(0, 0, 0, 0),
        };
        let end = LsaKey {
            lsa_type: self.lsa_type,
            adv_rtr,
            lsa_id: Ipv4Addr::new(255, 255, 255, 255),
        };
        self.tree
            .range((
                std::ops::Bound::Included(&begin),
                std::ops::Bound::Included(&end),
            ))
            .map(|(_, lse_idx)| (*lse_idx, &arena[*lse_idx]))
    }
}

// ===== impl LsdbKey =====

impl From<LsdbId> for LsdbKey {
    fn from(lsdb_id: LsdbId) -> LsdbKey {
        match lsdb_id {
            LsdbId::Area(area_id) => LsdbKey::Area(area_id.into()),
            LsdbId::As => LsdbKey::As,
        }
    }
}

// ===== global functions =====

pub(crate) fn lsdb_get<'a>(
    instance_lsdb: &'a Lsdb,
    areas: &'a Areas,
    lsdb_key: &LsdbKey,
) -> Result<(LsdbIndex, &'a Lsdb), Error> {
    match lsdb_key {
        LsdbKey::Area(area_key) => {
            let (area_idx, area) = areas.get_by_key(area_key)?;

            let lsdb_idx = LsdbIndex::Area(area_idx);
            let lsdb = &area.state.lsdb;
            Ok((lsdb_idx, lsdb))
        }
        LsdbKey::As => {
            let lsdb_idx = LsdbIndex::As;
            let lsdb = instance_lsdb;
            Ok((lsdb_idx, lsdb))
        }
    }
}

pub(crate) fn lsdb_get_mut<'a>(
    instance_lsdb: &'a mut Lsdb,
    areas: &'a mut Areas,
    lsdb_key: &LsdbKey,
) -> Result<(LsdbIndex, &'a mut Lsdb), Error> {
    match lsdb_key {
        LsdbKey::Area(area_key) => {
            let (area_idx, area) = areas.get_mut_by_key(area_key)?;

            let lsdb_idx = LsdbIndex::Area(area_idx);
            let lsdb = &mut area.state.lsdb;
            Ok((lsdb_idx, lsdb))
        }
        LsdbKey::As => {
            let lsdb_idx = LsdbIndex::As;
            let lsdb = instance_lsdb;
            Ok((lsdb_idx, lsdb))
        }
    }
}

pub(crate) fn lsdb_index<'a>(
    instance_lsdb: &'a Lsdb,
    areas: &'a Areas,
    lsdb_idx: LsdbIndex,
) -> (LsdbId, &'a Lsdb) {
    match lsdb_idx {
        LsdbIndex::Area(area_idx) => {
            let area = &areas[area_idx];

            let lsdb = &area.state.lsdb;
            let lsdb_id = LsdbId::Area(area.id);
            (lsdb_id, lsdb)
        }
        LsdbIndex::As => {
            let lsdb_id = LsdbId::As;
            let lsdb = instance_lsdb;
            (lsdb_id, lsdb)
        }
    }
}

pub(crate) fn lsdb_index_mut<'a>(
    instance_lsdb: &'a mut Lsdb,
    areas: &'a mut Areas,
    lsdb_idx: LsdbIndex,
) -> (LsdbId, &'a mut Lsdb) {
    match lsdb_idx {
        LsdbIndex::Area(area_idx) => {
            let area = &mut areas[area_idx];

            let lsdb = &mut area.state.lsdb;
            let lsdb_id = LsdbId::Area(area.id);
            (lsdb_id, lsdb)
        }
        LsdbIndex::As => {
            let lsdb_id = LsdbId::As;
            let lsdb = instance_lsdb;
            (lsdb_id, lsdb)
        }
    }
}
